pub mod config;
pub mod draw;
pub mod error;
pub mod tickets;

pub use config::FairnessConfig;
pub use draw::{select_winner, select_winner_seeded, EntryWeight};
pub use error::FairnessError;
pub use tickets::{compute_tickets, Entrant, TicketResult};
