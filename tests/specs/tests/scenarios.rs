// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: real sessions against the fake campus backend.

use std::time::Duration;

use quadchat::model::{
    ItemStatus, NavTarget, NotificationEntry, NotificationKind, NotificationPayload,
};
use quadchat::protocol::ClientEvent;
use quadchat::{Attachment, ChatSession, ConnectionStatus, ErrorCode, Identity, SessionUpdate};
use quadchat_specs::{eventually, eventually_within, FakeCampus};

async fn campus() -> anyhow::Result<FakeCampus> {
    let campus = FakeCampus::start().await?;
    campus.add_user("alice", "Alice Moreau");
    campus.add_user("bob", "Bob Okafor");
    campus.add_user("carol", "Carol Lin");
    Ok(campus)
}

/// Start a session and wait until the backend sees it as online.
async fn online(campus: &FakeCampus, user_id: &str) -> anyhow::Result<ChatSession> {
    let session = campus.session(user_id)?;
    eventually("session online", || {
        session.connection() == ConnectionStatus::Connected
            && campus.online_users().iter().any(|u| u == user_id)
    })
    .await?;
    Ok(session)
}

fn png() -> Attachment {
    Attachment::new("cat.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a])
}

fn joined(campus: &FakeCampus, user_id: &str, conversation_id: &str) -> bool {
    campus.frames_from(user_id).iter().any(|f| {
        matches!(f, ClientEvent::JoinConversation { conversation_id: id } if id == conversation_id)
    })
}

// -- Conversations ------------------------------------------------------------

#[tokio::test]
async fn get_or_create_is_idempotent() -> anyhow::Result<()> {
    let campus = campus().await?;
    let alice = campus.session("alice")?;

    let first = alice.get_or_create("bob").await?;
    let second = alice.get_or_create("bob").await?;
    assert_eq!(first.id, second.id);
    assert_eq!(alice.conversations().len(), 1);

    for other in ["alice", "  "] {
        let err = alice.get_or_create(other).await.err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::Validation), "{other:?}");
    }
    Ok(())
}

#[tokio::test]
async fn search_excludes_the_caller() -> anyhow::Result<()> {
    let campus = campus().await?;
    campus.add_user("alicia", "Alicia Reyes");
    let alice = campus.session("alice")?;

    let found = alice.search_users("ali").await?;
    let ids: Vec<_> = found.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, ["alicia"]);

    let before = campus.rest_calls();
    assert!(alice.search_users("   ").await?.is_empty());
    assert_eq!(campus.rest_calls(), before);
    Ok(())
}

// -- Messaging ------------------------------------------------------------------

#[tokio::test]
async fn empty_send_makes_no_request() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    let alice = campus.session("alice")?;

    let before = campus.rest_calls();
    let blank = alice.send(&conversation, Some("   "), None).await.err();
    assert_eq!(blank.map(|e| e.code), Some(ErrorCode::Validation));

    let pdf = Attachment::new("notes.pdf", "application/pdf", vec![1, 2, 3]);
    let not_image = alice.send(&conversation, None, Some(pdf)).await.err();
    assert_eq!(not_image.map(|e| e.code), Some(ErrorCode::Validation));

    assert_eq!(campus.rest_calls(), before);
    assert_eq!(campus.message_count(&conversation), 0);
    assert!(!alice.is_sending());
    Ok(())
}

#[tokio::test]
async fn first_message_reaches_recipient_live() -> anyhow::Result<()> {
    let campus = campus().await?;
    let alice = online(&campus, "alice").await?;
    let bob = online(&campus, "bob").await?;

    let conversation = alice.get_or_create("bob").await?;
    alice.select(&conversation.id).await?;
    let sent = alice.send(&conversation.id, Some("hello"), None).await?;

    eventually("bob sees the new conversation", || {
        bob.conversations().iter().any(|c| {
            c.id == conversation.id
                && c.last_message.as_ref().is_some_and(|m| m.message_id == sent.id)
        })
    })
    .await?;
    eventually("bob is notified", || bob.unread_notifications() == 1).await?;
    let entry = bob.notifications().into_iter().next();
    assert_eq!(entry.map(|e| e.title), Some("New message from Alice Moreau".to_owned()));

    // The sender's own echo never duplicates the confirmed message.
    assert_eq!(alice.messages().iter().filter(|m| m.id == sent.id).count(), 1);
    assert_eq!(alice.unread_notifications(), 0);

    bob.select(&conversation.id).await?;
    let contents: Vec<_> = bob.messages().into_iter().filter_map(|m| m.content).collect();
    assert_eq!(contents, ["hello"]);
    assert_eq!(campus.unread_count(&conversation.id, "bob"), 0);
    Ok(())
}

#[tokio::test]
async fn history_pages_newest_first() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    campus.seed_messages(&conversation, "bob", 120)?;
    let alice = online(&campus, "alice").await?;
    eventually("connect refresh settles", || {
        campus.rest_calls() >= 1 && !alice.is_loading_conversations()
    })
    .await?;

    alice.load_conversations().await?;
    let unread = |s: &ChatSession| {
        s.conversations().iter().find(|c| c.id == conversation).map(|c| c.unread_count)
    };
    assert_eq!(unread(&alice), Some(120));

    alice.select(&conversation).await?;
    let messages = alice.messages();
    assert_eq!(messages.len(), 50);
    assert_eq!(messages.last().and_then(|m| m.content.as_deref()), Some("message 119"));
    assert_eq!(campus.unread_count(&conversation, "alice"), 0);
    assert_eq!(unread(&alice), Some(0));
    assert!(messages.iter().all(|m| m.read));

    assert!(alice.load_older().await?);
    assert_eq!(alice.messages().len(), 100);
    assert!(alice.load_older().await?);
    let messages = alice.messages();
    assert_eq!(messages.len(), 120);
    assert_eq!(messages.first().and_then(|m| m.content.as_deref()), Some("message 0"));
    assert!(!alice.load_older().await?);
    Ok(())
}

#[tokio::test]
async fn last_selection_wins() -> anyhow::Result<()> {
    let campus = campus().await?;
    let with_bob = campus.seed_conversation("alice", "bob")?;
    let with_carol = campus.seed_conversation("alice", "carol")?;
    campus.seed_messages(&with_bob, "bob", 30)?;
    campus.seed_messages(&with_carol, "carol", 7)?;
    let alice = campus.session("alice")?;

    let (first, second) = tokio::join!(alice.select(&with_bob), alice.select(&with_carol));
    first?;
    second?;

    assert_eq!(alice.active_conversation().as_deref(), Some(with_carol.as_str()));
    let messages = alice.messages();
    assert_eq!(messages.len(), 7);
    assert!(messages.iter().all(|m| m.conversation_id == with_carol));
    Ok(())
}

#[tokio::test]
async fn room_membership_never_overlaps() -> anyhow::Result<()> {
    let campus = campus().await?;
    let with_bob = campus.seed_conversation("alice", "bob")?;
    let with_carol = campus.seed_conversation("alice", "carol")?;
    let alice = online(&campus, "alice").await?;

    alice.select(&with_bob).await?;
    alice.select(&with_carol).await?;
    alice.close();

    let expected = vec![
        ClientEvent::JoinConversation { conversation_id: with_bob.clone() },
        ClientEvent::LeaveConversation { conversation_id: with_bob.clone() },
        ClientEvent::JoinConversation { conversation_id: with_carol.clone() },
        ClientEvent::LeaveConversation { conversation_id: with_carol.clone() },
    ];
    let membership = || -> Vec<ClientEvent> {
        campus.frames_from("alice").into_iter().filter(ClientEvent::is_room_membership).collect()
    };
    eventually("room frames arrive", || membership().len() >= expected.len()).await?;
    assert_eq!(membership(), expected);
    assert_eq!(alice.active_conversation(), None);
    assert!(alice.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn attachment_previews_are_released() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    let alice = campus.session("alice")?;
    alice.select(&conversation).await?;

    alice.attach(png())?;
    assert_eq!(alice.live_previews(), 1);
    let preview = alice.attachment_preview();
    assert!(preview.is_some_and(|url| url.starts_with("data:image/png;base64,")));
    let sent = alice.send_draft(&conversation).await?;
    assert!(sent.attachment.is_some());
    assert_eq!(alice.live_previews(), 0);
    assert!(alice.attachment_preview().is_none());

    alice.attach(png())?;
    alice.attach(png())?;
    assert_eq!(alice.live_previews(), 1);
    alice.close();
    assert_eq!(alice.live_previews(), 0);

    alice.attach(png())?;
    alice.shutdown();
    assert_eq!(alice.live_previews(), 0);
    Ok(())
}

// -- Typing and presence ------------------------------------------------------

#[tokio::test]
async fn typing_indicator_appears_and_clears() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    let alice = online(&campus, "alice").await?;
    let bob = online(&campus, "bob").await?;
    alice.select(&conversation).await?;
    bob.select(&conversation).await?;
    eventually("both in the room", || {
        joined(&campus, "alice", &conversation) && joined(&campus, "bob", &conversation)
    })
    .await?;

    for draft in ["h", "he", "hey"] {
        alice.compose(&conversation, draft);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    eventually("bob sees alice typing", || bob.typing_users(&conversation) == ["alice"]).await?;
    eventually_within(Duration::from_secs(6), "typing clears", || {
        bob.typing_users(&conversation).is_empty()
    })
    .await?;

    let frames = campus.frames_from("alice");
    let starts = frames.iter().filter(|f| matches!(f, ClientEvent::TypingStart { .. })).count();
    let stops = frames.iter().filter(|f| matches!(f, ClientEvent::TypingStop { .. })).count();
    assert_eq!((starts, stops), (1, 1));
    Ok(())
}

#[tokio::test]
async fn presence_tracks_other_users() -> anyhow::Result<()> {
    let campus = campus().await?;
    let alice = online(&campus, "alice").await?;
    eventually("snapshot received", || alice.presence_known()).await?;
    assert!(!alice.is_online("bob"));

    let bob = online(&campus, "bob").await?;
    eventually("bob comes online", || alice.is_online("bob")).await?;

    bob.shutdown();
    eventually("bob goes offline", || !alice.is_online("bob")).await?;
    Ok(())
}

#[tokio::test]
async fn reconnect_resyncs_room_and_presence() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    let alice = online(&campus, "alice").await?;
    alice.select(&conversation).await?;
    eventually("presence known", || alice.presence_known()).await?;

    campus.set_refuse_channel(true);
    assert!(campus.drop_connections("alice") >= 1);
    eventually("degraded while offline", || {
        alice.connection() == ConnectionStatus::Disconnected && !alice.presence_known()
    })
    .await?;

    let refreshes_before = campus.rest_calls();
    campus.set_refuse_channel(false);
    eventually("reconnected", || {
        alice.connection() == ConnectionStatus::Connected && alice.presence_known()
    })
    .await?;

    let rejoins = || {
        campus
            .frames_from("alice")
            .iter()
            .filter(|f| {
                matches!(f, ClientEvent::JoinConversation { conversation_id: id }
                    if *id == conversation)
            })
            .count()
    };
    eventually("room rejoined", || rejoins() == 2).await?;
    eventually("conversations refreshed", || campus.rest_calls() > refreshes_before).await?;
    assert_eq!(alice.active_conversation().as_deref(), Some(conversation.as_str()));
    Ok(())
}

// -- Notifications ------------------------------------------------------------

#[tokio::test]
async fn listing_push_opens_without_server_calls() -> anyhow::Result<()> {
    let campus = campus().await?;
    let bob = online(&campus, "bob").await?;

    let item = campus.push_item("Blue umbrella", ItemStatus::Lost);
    eventually("item notification", || bob.unread_notifications() == 1).await?;
    let entry = bob.notifications().into_iter().next();
    let Some(entry) = entry else { anyhow::bail!("no notification entry") };
    assert_eq!(entry.title, "New lost item reported");
    assert_eq!(entry.kind, NotificationKind::Item);

    let before = campus.rest_calls();
    let target = bob.open_notification(&entry.id).await?;
    assert_eq!(target, Some(NavTarget::Item(item)));
    assert_eq!(bob.unread_notifications(), 0);

    let book = campus.push_book("Linear Algebra Done Right", 2500);
    eventually("book notification", || bob.unread_notifications() == 1).await?;
    let Some(entry) = bob.notifications().into_iter().next() else {
        anyhow::bail!("no book entry")
    };
    assert_eq!(entry.title, "New book listed");
    bob.delete_notification(&entry.id).await?;
    assert_eq!(bob.unread_notifications(), 0);
    let book_listed = |e: &NotificationEntry| e.payload.book_id.as_deref() == Some(book.as_str());
    assert!(!bob.notifications().iter().any(book_listed));

    assert_eq!(campus.rest_calls(), before);
    Ok(())
}

#[tokio::test]
async fn server_notifications_sync_read_and_delete() -> anyhow::Result<()> {
    let campus = campus().await?;
    let conversation = campus.seed_conversation("alice", "bob")?;
    let payload =
        NotificationPayload { conversation_id: Some(conversation.clone()), ..Default::default() };
    let first = campus.seed_notification("bob", NotificationKind::Message, "Hi", payload.clone());
    let second = campus.seed_notification("bob", NotificationKind::Message, "Again", payload);
    let bob = campus.session("bob")?;

    bob.load_notifications().await?;
    assert_eq!(bob.unread_notifications(), 2);
    assert_eq!(bob.notifications().first().map(|e| e.id.as_str()), Some(second.as_str()));

    bob.mark_notification_read(&first).await?;
    assert_eq!(bob.unread_notifications(), 1);
    assert_eq!(campus.notification("bob", &first).map(|e| e.read), Some(true));

    let before = campus.rest_calls();
    bob.mark_notification_read(&first).await?;
    assert_eq!(campus.rest_calls(), before);

    let target = bob.open_notification(&second).await?;
    assert_eq!(target, Some(NavTarget::Conversation(conversation)));
    assert_eq!(bob.unread_notifications(), 0);

    bob.delete_notification(&first).await?;
    assert!(campus.notification("bob", &first).is_none());
    assert_eq!(bob.notifications().len(), 1);
    Ok(())
}

// -- Auth -------------------------------------------------------------------------

#[tokio::test]
async fn unknown_token_requires_login() -> anyhow::Result<()> {
    let campus = campus().await?;
    let mallory = ChatSession::start(campus.config(), Identity::new("mallory", "mallory"))?;
    let mut updates = mallory.subscribe();

    let err = mallory.load_conversations().await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::Unauthorized));

    let mut saw_auth_required = false;
    while let Ok(update) = updates.try_recv() {
        saw_auth_required |= update == SessionUpdate::AuthRequired;
    }
    assert!(saw_auth_required);
    assert_ne!(mallory.connection(), ConnectionStatus::Connected);
    Ok(())
}
