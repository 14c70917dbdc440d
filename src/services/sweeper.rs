//! Background removal of expired pending reservations

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::reservations::ReservationsService;
use crate::models::user::Actor;

/// Sweep once immediately, then every `interval`, until the runtime shuts down
pub fn spawn_expiry_sweeper(service: ReservationsService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let actor = Actor::system();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.sweep(&actor).await {
                Ok(0) => tracing::debug!("Expiry sweep found nothing to remove"),
                Ok(removed) => tracing::info!("Expiry sweep removed {} reservations", removed),
                Err(e) => tracing::error!("Expiry sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        models::{book::BookStatus, reservation::ReservationStatus},
        services::{
            clock::Clock,
            notifier::ChangeNotifier,
            testing::{FixedClock, InMemoryLibrary},
        },
    };

    #[tokio::test]
    async fn test_sweeper_runs_at_start() {
        let store = Arc::new(InMemoryLibrary::new());
        let clock = Arc::new(FixedClock::new());
        let book = store.add_book("Operating Systems", "CS-101", BookStatus::Available);
        let stale = store.add_reservation(
            ("Asha Rao", "STU-1"),
            &book,
            ReservationStatus::Pending,
            clock.now() - ChronoDuration::hours(30),
        );
        let service = ReservationsService::new(
            store.clone(),
            store.clone(),
            clock,
            ChangeNotifier::new(4),
            ChronoDuration::hours(24),
        );

        let handle = spawn_expiry_sweeper(service, Duration::from_secs(3600));
        for _ in 0..50 {
            if store.reservation(stale.id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(store.reservation(stale.id).is_none());
    }
}
