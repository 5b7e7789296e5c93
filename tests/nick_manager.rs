//! Integration tests for nick validation and nick changes.

mod common;

use common::{Harness, NickBehavior, server};
use slirc_bridge::{
    ClientConfig, ClientEvent, ClientIdentity, ErrorCode, InboundEvent, InvalidNick, NickError,
    OutboundCommand, RequestState, ServerSupport,
};
use std::time::Duration;

#[tokio::test]
async fn test_change_nick_confirmed() {
    let mut h = Harness::connected(server()).await;
    assert_eq!(h.client.nick(), "alice");

    let message = h.client.change_nick("bob", false).await.unwrap();
    assert!(message.contains("alice"), "message: {message}");
    assert!(message.contains("bob"), "message: {message}");
    assert_eq!(h.client.nick(), "bob");
    assert_eq!(h.client.pending_nick_state(), RequestState::Settled);
    assert_eq!(h.client.listener_count(), 0);

    // The existence check's "no such nick" is not a user-facing error.
    assert!(h.sink.notices().is_empty());

    let events = h.drain_events();
    assert_eq!(
        events,
        vec![
            ClientEvent::Connected {
                nick: "alice".into()
            },
            ClientEvent::PendingNickAdd("bob".into()),
            ClientEvent::NickChange {
                old: "alice".into(),
                new: "bob".into()
            },
            ClientEvent::PendingNickRemove("bob".into()),
        ]
    );
}

#[tokio::test]
async fn test_change_to_current_nick_is_rejected() {
    let h = Harness::connected(server()).await;
    let err = h.client.change_nick("alice", false).await.unwrap_err();
    assert_eq!(err, NickError::AlreadyHeld("alice".into()));
    assert_eq!(h.conn().whois_requests(), 0);
}

#[tokio::test]
async fn test_strict_change_reports_invalid_nick() {
    let h = Harness::connected(server()).await;
    let err = h.client.change_nick("bad nick", true).await.unwrap_err();
    assert_eq!(
        err,
        NickError::Invalid(InvalidNick::IllegalCharacters("bad nick".into()))
    );
    assert_eq!(err.to_string(), "Nick 'bad nick' contains illegal characters.");
    assert!(h.conn().sent().is_empty());
}

#[tokio::test]
async fn test_change_to_taken_nick_is_rejected() {
    let h = Harness::connected(server()).await;
    h.conn().add_user("bob", "Bob");

    let err = h.client.change_nick("bob", false).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "The nickname bob is taken on irc.example.net. Please pick a different nick."
    );
    assert!(
        !h.conn()
            .sent()
            .iter()
            .any(|c| matches!(c, OutboundCommand::Nick(_)))
    );
}

#[tokio::test]
async fn test_server_rejection_settles_change() {
    let mut h = Harness::connected(server()).await;
    h.conn()
        .set_nick_behavior(NickBehavior::Reject(ErrorCode::ErroneusNickname));

    let err = h.client.change_nick("bob", false).await.unwrap_err();
    assert_eq!(err, NickError::Rejected(ErrorCode::ErroneusNickname));
    assert_eq!(h.client.nick(), "alice");
    assert_eq!(h.client.listener_count(), 0);

    let events = h.drain_events();
    assert!(events.contains(&ClientEvent::PendingNickAdd("bob".into())));
    assert!(events.contains(&ClientEvent::PendingNickRemove("bob".into())));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_change_times_out() {
    let mut h = Harness::connected(server()).await;
    h.conn().set_nick_behavior(NickBehavior::Silent);

    let start = tokio::time::Instant::now();
    let err = h.client.change_nick("bob", false).await.unwrap_err();
    assert_eq!(err, NickError::Timeout);
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(h.client.nick(), "alice");
    assert_eq!(h.client.listener_count(), 0);
    assert!(
        h.drain_events()
            .contains(&ClientEvent::PendingNickRemove("bob".into()))
    );
}

#[tokio::test]
async fn test_change_without_connection() {
    let h = Harness::new(server());
    let err = h.client.change_nick("bob", false).await.unwrap_err();
    assert_eq!(err, NickError::NoConnection);
    assert!(!err.is_user_visible());
}

#[tokio::test]
async fn test_server_forced_rename_updates_nick() {
    let mut h = Harness::connected(server()).await;
    h.conn().emit(InboundEvent::Nick {
        old: "alice".into(),
        new: "alice_".into(),
    });

    let event = h
        .next_event(|e| matches!(e, ClientEvent::NickChange { .. }))
        .await;
    assert_eq!(
        event,
        ClientEvent::NickChange {
            old: "alice".into(),
            new: "alice_".into()
        }
    );
    assert_eq!(h.client.nick(), "alice_");
}

#[tokio::test]
async fn test_other_users_renames_are_ignored() {
    let h = Harness::connected(server()).await;
    h.conn().emit(InboundEvent::Nick {
        old: "carol".into(),
        new: "dave".into(),
    });
    common::settle().await;
    assert_eq!(h.client.nick(), "alice");
}

#[tokio::test]
async fn test_valid_nick_uses_server_nicklen() {
    let h = Harness::new(server());
    // No connection: no length rule.
    assert_eq!(
        h.client.valid_nick("abcdefghijkl", false).unwrap(),
        "abcdefghijkl"
    );

    h.client.connect().await.unwrap();
    h.conn().set_support(ServerSupport {
        nick_len: Some(5),
        ..ServerSupport::default()
    });
    assert_eq!(h.client.valid_nick("abcdefghijkl", false).unwrap(), "abcde");
    assert_eq!(
        h.client.valid_nick("abcdefghijkl", true),
        Err(InvalidNick::TooLong {
            nick: "abcdefghijkl".into(),
            max: 5
        })
    );
}

#[tokio::test]
async fn test_initial_nick_comes_from_template() {
    let identity =
        ClientIdentity::user("irc.example.net", "@jo:example.org").with_display_name("Jo Bloggs");
    let h = Harness::build(identity, server(), ClientConfig::default(), |c| c);
    assert_eq!(h.client.nick(), "M-JoBloggs");
}
