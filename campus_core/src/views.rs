use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::{auth::Viewer, ids::PostId};

/// Counts a viewer at most once per post within a sliding window.
///
/// State lives in process memory; a restart forgets who has seen what.
#[derive(Clone, Debug)]
pub struct ViewThrottle {
    window: Duration,
    seen: Arc<Mutex<HashMap<(String, PostId), Instant>>>,
}

impl ViewThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes * 60))
    }

    /// Returns `true` when this view should bump the post's counter.
    pub async fn should_count(&self, viewer: &Viewer, post: PostId) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;

        // expired entries
        seen.retain(|_, expires| *expires > now);

        let key = (viewer.key(), post);
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now + self.window);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    #[tokio::test]
    async fn test_counts_once_per_window() {
        let throttle = ViewThrottle::new(Duration::from_millis(50));
        let viewer = Viewer::User(UserId::new());
        let post = PostId::new();

        assert!(throttle.should_count(&viewer, post).await);
        assert!(!throttle.should_count(&viewer, post).await);
        assert!(throttle.should_count(&viewer, PostId::new()).await);
        assert!(
            throttle
                .should_count(&Viewer::Anonymous("10.0.0.1".into()), post)
                .await
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(throttle.should_count(&viewer, post).await);
    }
}
