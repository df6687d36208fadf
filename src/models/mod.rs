pub mod booking;
pub mod conversation;
pub mod message;
pub mod user;

pub use booking::{Booking, BookingAction, BookingStatus, NewBooking, StatusPatch};
pub use conversation::{ConversationSummary, UNKNOWN_PEER_NAME};
pub use message::{Message, NewMessage, SeenAtPatch, SeenScope};
pub use user::User;
