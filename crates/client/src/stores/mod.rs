//! Merged message and notification streams and the task that owns them.

pub mod messages;
pub mod notifications;
pub mod reconciler;
pub mod stream;

pub use messages::{MessageStream, MessageView};
pub use notifications::{NotificationStream, NotificationView};
pub use reconciler::{spawn_reconciler, Changed, Reconciler, ReconcilerHandle, StreamInput};
pub use stream::{Hydration, MergedStream, StreamItem};
