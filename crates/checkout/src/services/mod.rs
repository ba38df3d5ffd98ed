//! Collaborator traits and implementations used by checkout.

pub mod notification;

pub use notification::{Delivery, InMemoryNotifier, LogNotifier, NotificationError, Notifier};
