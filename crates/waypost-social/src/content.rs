use std::sync::Arc;

use tracing::debug;
use waypost_shared::constants::{comment_message, like_message};
use waypost_shared::{Notification, NotificationType, PostId, UserId};
use waypost_store::DocumentStore;

use crate::error::{Result, SocialError};
use crate::notifications::{NewNotification, NotificationFanout};
use crate::profiles::display_name;
use crate::visibility::is_blocked;

/// Notifies post authors about likes and comments.
#[derive(Clone)]
pub struct ContentNotifier {
    store: Arc<dyn DocumentStore>,
    fanout: NotificationFanout,
}

impl ContentNotifier {
    pub fn new(store: Arc<dyn DocumentStore>, fanout: NotificationFanout) -> Self {
        Self { store, fanout }
    }

    /// `false` for your own post or a block between actor and author.
    async fn should_notify(&self, actor: &UserId, author: &UserId) -> Result<bool> {
        if actor == author {
            return Ok(false);
        }
        Ok(!is_blocked(self.store.as_ref(), author, actor).await?)
    }

    pub async fn notify_like(
        &self,
        actor: &UserId,
        post: &PostId,
        author: &UserId,
    ) -> Result<Option<Notification>> {
        if !self.should_notify(actor, author).await? {
            debug!(actor = %actor, author = %author, post = %post, "Like notification skipped");
            return Ok(None);
        }

        let name = display_name(self.store.as_ref(), actor).await?;
        let sent = self
            .fanout
            .emit(NewNotification {
                kind: NotificationType::Like,
                sender: actor.clone(),
                receiver: author.clone(),
                message: like_message(&name),
                status: None,
                post_id: Some(post.clone()),
            })
            .await?;
        Ok(Some(sent))
    }

    pub async fn notify_comment(
        &self,
        actor: &UserId,
        post: &PostId,
        author: &UserId,
        text: &str,
    ) -> Result<Option<Notification>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SocialError::InvalidInput("comment must not be empty".into()));
        }
        if !self.should_notify(actor, author).await? {
            debug!(actor = %actor, author = %author, post = %post, "Comment notification skipped");
            return Ok(None);
        }

        let name = display_name(self.store.as_ref(), actor).await?;
        let sent = self
            .fanout
            .emit(NewNotification {
                kind: NotificationType::Comment,
                sender: actor.clone(),
                receiver: author.clone(),
                message: comment_message(&name, text),
                status: None,
                post_id: Some(post.clone()),
            })
            .await?;
        Ok(Some(sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_shared::constants::BLOCKS;
    use waypost_store::{DocKey, FieldOp, MemoryStore};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn setup() -> (Arc<dyn DocumentStore>, NotificationFanout, ContentNotifier) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let fanout = NotificationFanout::new(store.clone(), 50);
        let notifier = ContentNotifier::new(store.clone(), fanout.clone());
        (store, fanout, notifier)
    }

    #[tokio::test]
    async fn like_reaches_author() {
        let (_, fanout, notifier) = setup();
        let post = PostId("p1".into());

        let sent = notifier
            .notify_like(&uid("alice"), &post, &uid("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.kind, NotificationType::Like);
        assert_eq!(sent.message, "alice liked your post.");
        assert_eq!(sent.post_id, Some(post));

        assert_eq!(fanout.list_for_user(&uid("bob")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn comment_carries_text() {
        let (_, _, notifier) = setup();
        let sent = notifier
            .notify_comment(&uid("alice"), &PostId("p1".into()), &uid("bob"), " nice view ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.kind, NotificationType::Comment);
        assert_eq!(sent.message, "alice commented: nice view");
    }

    #[tokio::test]
    async fn own_post_is_silent() {
        let (_, fanout, notifier) = setup();
        let sent = notifier
            .notify_like(&uid("bob"), &PostId("p1".into()), &uid("bob"))
            .await
            .unwrap();
        assert!(sent.is_none());
        assert!(fanout.list_for_user(&uid("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_actor_is_silent() {
        let (store, fanout, notifier) = setup();
        store
            .upsert(
                &DocKey::new(BLOCKS, "bob"),
                vec![FieldOp::union("blockedUserIds", "alice")],
            )
            .await
            .unwrap();

        let sent = notifier
            .notify_comment(&uid("alice"), &PostId("p1".into()), &uid("bob"), "hi")
            .await
            .unwrap();
        assert!(sent.is_none());
        assert!(fanout.list_for_user(&uid("bob")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_comment_rejected() {
        let (_, _, notifier) = setup();
        assert!(matches!(
            notifier
                .notify_comment(&uid("alice"), &PostId("p1".into()), &uid("bob"), "  ")
                .await,
            Err(SocialError::InvalidInput(_))
        ));
    }
}
