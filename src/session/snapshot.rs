use chrono::{DateTime, Utc};

use super::identity::SessionIdentity;
use crate::media::StillImage;
use crate::transport::FileMessage;

/// One still grabbed during a recording, tagged with its session
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub captured_at: DateTime<Utc>,
    /// Encoded still as a data URL
    pub image_data: String,
    pub session_timestamp: i64,
    pub user_id: String,
}

impl FrameSnapshot {
    pub fn new(still: StillImage, identity: &SessionIdentity) -> Self {
        Self {
            captured_at: still.captured_at,
            image_data: still.data_url,
            session_timestamp: identity.session_timestamp,
            user_id: identity.user_id.clone(),
        }
    }
}

impl From<FrameSnapshot> for FileMessage {
    fn from(snapshot: FrameSnapshot) -> Self {
        FileMessage {
            data_timestamp: snapshot.captured_at.timestamp_millis(),
            data: snapshot.image_data,
            session_timestamp: snapshot.session_timestamp,
            user: snapshot.user_id,
        }
    }
}
