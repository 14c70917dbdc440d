//! Business logic services

pub mod books;
pub mod clock;
pub mod notifier;
pub mod reservations;
pub mod stats;
pub mod sweeper;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub reservations: reservations::ReservationsService,
    pub users: users::UsersService,
    pub stats: stats::StatsService,
    pub notifier: notifier::ChangeNotifier,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let notifier = notifier::ChangeNotifier::new(config.events.channel_capacity);

        let reservations = reservations::ReservationsService::new(
            Arc::new(repository.books.clone()),
            Arc::new(repository.reservations.clone()),
            Arc::new(clock::SystemClock),
            notifier.clone(),
            config.reservations.max_age(),
        );

        Self {
            books: books::BooksService::new(
                repository.books.clone(),
                repository.reservations.clone(),
                notifier.clone(),
            ),
            reservations,
            users: users::UsersService::new(
                repository.users.clone(),
                config.auth.clone(),
                notifier.clone(),
            ),
            stats: stats::StatsService::new(repository.clone()),
            notifier,
            repository,
        }
    }

    /// Check that storage is reachable
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
