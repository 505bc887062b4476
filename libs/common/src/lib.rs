pub mod events;
pub mod id;
pub mod normalize;
pub mod notification;

pub use events::{ClientEventName, Envelope, EventName, ServerEvent};
pub use normalize::normalize;
pub use notification::{EntityType, Notification, NotificationKind, UserRef};
