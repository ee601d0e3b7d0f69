pub mod notifier;
pub mod ticket_notice;
pub mod tickets;
