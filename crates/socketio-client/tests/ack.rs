//! Tests for acknowledgements in both directions
mod fixture;
mod utils;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use fixture::{connected, recv, settle, written_str};
use socketio_client::{AckError, PayloadValue};

#[tokio::test(start_paused = true)]
async fn callback_is_called_once() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls2 = calls.clone();
    socket
        .emit_with_callback("question", &1, move |args| {
            calls2.lock().unwrap().push(args);
        })
        .unwrap();
    assert_eq!(written_str(&mut conn).await, [r#"20["question",1]"#]);

    recv(&conn, "30[42]");
    recv(&conn, "30[43]");
    settle().await;
    assert_eq!(*calls.lock().unwrap(), [vec![PayloadValue::from(42)]]);
}

#[tokio::test(start_paused = true)]
async fn ack_ids_increase() {
    let (_manager, socket, _server, mut conn) = connected("/chat").await;
    socket.emit_with_callback("a", &(), |_| ()).unwrap();
    socket.emit_with_callback("b", &(), |_| ()).unwrap();
    socket.emit("c", &()).unwrap();
    assert_eq!(
        written_str(&mut conn).await,
        [r#"2/chat,0["a"]"#, r#"2/chat,1["b"]"#, r#"2/chat,["c"]"#]
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_ack_is_ignored() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    let called = Arc::new(Mutex::new(false));
    let called2 = called.clone();
    socket
        .emit_with_callback("question", &(), move |_| *called2.lock().unwrap() = true)
        .unwrap();
    written_str(&mut conn).await;

    recv(&conn, r#"37["nope"]"#);
    settle().await;
    assert!(!*called.lock().unwrap());
    assert!(socket.connected());

    recv(&conn, r#"30["yes"]"#);
    settle().await;
    assert!(*called.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn emit_with_ack_resolves() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    let res = socket
        .emit_with_ack::<_, (String, u32)>("join", &"room")
        .unwrap();
    assert_eq!(written_str(&mut conn).await, [r#"20["join","room"]"#]);
    recv(&conn, r#"30["ok",3]"#);
    assert_eq!(assert_ok!(res.await), ("ok".to_string(), 3));
}

#[tokio::test(start_paused = true)]
async fn emit_with_ack_times_out() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    let res = socket
        .emit_with_ack_timeout::<_, String>("join", &(), Duration::from_secs(2))
        .unwrap();
    written_str(&mut conn).await;
    assert!(matches!(res.await, Err(AckError::Timeout)));

    // A late ack is dropped
    recv(&conn, r#"30["late"]"#);
    settle().await;
    assert!(socket.connected());
}

#[tokio::test(start_paused = true)]
async fn pending_acks_are_dropped_on_disconnect() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    let res = socket.emit_with_ack::<_, String>("join", &()).unwrap();
    written_str(&mut conn).await;
    conn.close();
    assert!(matches!(res.await, Err(AckError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn server_requested_ack() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    socket.on("question", |event| {
        let ack = event.ack().unwrap();
        assert_eq!(ack.id(), 5);
        let ack2 = ack.clone();
        ack.send("answer").unwrap();
        // Only the first answer is sent
        ack2.send("other").unwrap();
        assert!(ack2.is_sent());
    });
    recv(&conn, r#"25["question",1]"#);
    assert_eq!(written_str(&mut conn).await, [r#"35["answer"]"#]);
}

#[tokio::test(start_paused = true)]
async fn ack_with_several_args() {
    let (_manager, socket, _server, mut conn) = connected("/").await;
    socket.on("question", |event| {
        let n: u32 = event.data().unwrap();
        event.ack().unwrap().send(&(n + 1, "two")).unwrap();
    });
    recv(&conn, r#"21["question",1]"#);
    assert_eq!(written_str(&mut conn).await, [r#"31[2,"two"]"#]);
}
