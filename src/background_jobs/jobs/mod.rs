//! Specific job implementations.

pub mod reservation_notification;

pub use reservation_notification::ReservationNotificationJob;
