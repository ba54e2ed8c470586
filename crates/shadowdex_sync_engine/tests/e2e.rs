//! End-to-end sync sessions over the in-memory transport.

use ciborium::value::Value;
use shadowdex_core::{
    Config, CoreResult, Database, InMemoryBackend, Note, NoteDraft, NoteId, StorageBackend,
};
use shadowdex_sync_engine::{
    MemoryHub, MemoryTransport, SessionEvent, SessionListener, SyncConfig, SyncEngine, SyncError,
    SyncErrorKind, SyncPhase, SyncState, Transport,
};
use shadowdex_sync_protocol::{Decoded, RendezvousId, SyncMessage, DEFAULT_MAX_PAYLOAD_BYTES};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn note(id: &str, updated_at: u64) -> Note {
    Note::from_draft(
        NoteId::from(id),
        NoteDraft::new(format!("{id}@{updated_at}"), "その他"),
        updated_at,
    )
}

fn store(notes: &[Note]) -> Arc<Database> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    for n in notes {
        db.put_note(n.clone()).unwrap();
    }
    db
}

fn contents(db: &Database) -> Vec<(String, u64)> {
    db.all_notes()
        .unwrap()
        .into_iter()
        .map(|n| (n.id.to_string(), n.updated_at))
        .collect()
}

/// Backend whose writes start failing once `fail` is set.
struct FailingBackend {
    inner: InMemoryBackend,
    fail: Arc<AtomicBool>,
}

impl StorageBackend for FailingBackend {
    fn load(&self) -> CoreResult<Option<Vec<u8>>> {
        self.inner.load()
    }

    fn store(&self, snapshot: &[u8]) -> CoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
        }
        self.inner.store(snapshot)
    }
}

fn config() -> SyncConfig {
    SyncConfig::new().with_linger(Duration::from_millis(10))
}

fn engine(hub: &MemoryHub, db: Arc<Database>) -> SyncEngine<MemoryTransport> {
    SyncEngine::new(db, hub.transport(), config())
}

fn cbor(value: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).unwrap();
    bytes
}

/// Records phases until a terminal one.
fn record(engine: &SyncEngine<MemoryTransport>) -> tokio::task::JoinHandle<Vec<SyncPhase>> {
    let mut rx = engine.subscribe();
    let mut seen = vec![rx.borrow_and_update().phase()];
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let phase = rx.borrow_and_update().phase();
            seen.push(phase);
            if phase.is_terminal() {
                break;
            }
        }
        seen
    })
}

fn in_order(seen: &[SyncPhase], expected: &[SyncPhase]) -> bool {
    let mut rest = seen.iter();
    expected.iter().all(|want| rest.any(|got| got == want))
}

#[tokio::test]
async fn both_peers_converge() {
    let hub = MemoryHub::new();
    let a = store(&[note("n1", 100)]);
    let b = store(&[note("n1", 200), note("n2", 50)]);
    let host = engine(&hub, a.clone());
    let guest = engine(&hub, b.clone());

    let id = host.start_hosting().await.unwrap();
    guest.connect_to_host(id.as_str()).await.unwrap();

    let host_report = host.wait_for_completion().await.unwrap();
    let guest_report = guest.wait_for_completion().await.unwrap();

    let expected = vec![("n1".to_string(), 200), ("n2".to_string(), 50)];
    assert_eq!(contents(&a), expected);
    assert_eq!(contents(&b), expected);

    assert_eq!(host_report.sent, 1);
    assert_eq!(host_report.replaced, 1);
    assert_eq!(host_report.inserted, 1);
    assert_eq!(guest_report.sent, 2);
    assert_eq!(guest_report.kept, 1);
    assert_eq!(guest_report.inserted, 0);
}

#[tokio::test]
async fn host_and_guest_walk_the_state_machine() {
    let hub = MemoryHub::new();
    hub.queue_id(RendezvousId::parse("shadow-dex-ab12cd34").unwrap());
    let host = engine(&hub, store(&[note("a", 1)]));
    let guest = engine(&hub, store(&[note("b", 2)]));
    let host_seen = record(&host);
    let guest_seen = record(&guest);

    let id = host.start_hosting().await.unwrap();
    assert_eq!(id.as_str(), "shadow-dex-ab12cd34");
    assert_eq!(host.state().rendezvous_id(), Some(&id));

    guest.connect_to_host("shadow-dex-ab12cd34").await.unwrap();
    host.wait_for_completion().await.unwrap();
    guest.wait_for_completion().await.unwrap();

    let host_seen = host_seen.await.unwrap();
    let guest_seen = guest_seen.await.unwrap();
    assert!(
        in_order(&host_seen, &[SyncPhase::Idle, SyncPhase::Success]),
        "{host_seen:?}"
    );
    assert!(
        in_order(&guest_seen, &[SyncPhase::Idle, SyncPhase::Success]),
        "{guest_seen:?}"
    );
    for seen in [&host_seen, &guest_seen] {
        for pair in seen.windows(2) {
            assert!(pair[0] != pair[1], "{seen:?}");
        }
    }
    assert!(!host_seen.contains(&SyncPhase::Error));
    assert!(!guest_seen.contains(&SyncPhase::Error));
}

#[tokio::test]
async fn host_is_syncing_until_the_peer_payload_arrives() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[note("a", 1)]));
    let id = host.start_hosting().await.unwrap();

    let mut peer = hub.transport().join_session(&id).await.unwrap();
    host.subscribe()
        .wait_for(|s| *s == SyncState::Syncing)
        .await
        .unwrap();

    let SessionEvent::Data(bytes) = peer.recv().await else {
        panic!("expected the host payload");
    };
    let Decoded::Message(SyncMessage::SyncData { entries }) =
        SyncMessage::decode(&bytes, DEFAULT_MAX_PAYLOAD_BYTES).unwrap()
    else {
        panic!("expected SYNC_DATA");
    };
    assert_eq!(entries, vec![note("a", 1)]);
    assert_eq!(host.state(), SyncState::Syncing);

    let payload = SyncMessage::sync_data(vec![note("b", 5)])
        .encode(DEFAULT_MAX_PAYLOAD_BYTES)
        .unwrap();
    peer.send(payload).await.unwrap();

    let report = host.wait_for_completion().await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(peer.recv().await, SessionEvent::Closed);
}

#[tokio::test]
async fn guest_is_syncing_until_the_host_payload_arrives() {
    let hub = MemoryHub::new();
    let transport = hub.transport();
    let listener = transport.create_session().await.unwrap();
    let id = listener.rendezvous_id().clone();
    let guest = engine(&hub, store(&[note("g", 9)]));

    guest.connect_to_host(id.as_str()).await.unwrap();
    let mut peer = listener.accept().await.unwrap();
    guest
        .subscribe()
        .wait_for(|s| *s == SyncState::Syncing)
        .await
        .unwrap();
    assert!(matches!(peer.recv().await, SessionEvent::Data(_)));
    assert_eq!(guest.state(), SyncState::Syncing);

    let payload = SyncMessage::sync_data(Vec::new())
        .encode(DEFAULT_MAX_PAYLOAD_BYTES)
        .unwrap();
    peer.send(payload).await.unwrap();
    let report = guest.wait_for_completion().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.inserted, 0);
}

#[tokio::test]
async fn malformed_id_fails_without_joining() {
    let hub = MemoryHub::new();
    let guest = engine(&hub, store(&[]));

    let result = guest.connect_to_host("not-a-real-id").await;
    assert!(matches!(result, Err(SyncError::Connection(_))));
    assert!(matches!(
        guest.state(),
        SyncState::Error {
            kind: SyncErrorKind::Connection,
            ..
        }
    ));
    assert_eq!(hub.join_attempts(), 0);
}

#[tokio::test]
async fn unknown_id_is_a_connection_error() {
    let hub = MemoryHub::new();
    let guest = engine(&hub, store(&[]));

    guest.connect_to_host("shadow-dex-nobody00").await.unwrap();
    let err = guest.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Connection);
    assert_eq!(hub.join_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_join_times_out() {
    let hub = MemoryHub::new();
    hub.set_join_delay(Duration::from_secs(60));
    let guest = SyncEngine::new(
        store(&[]),
        hub.transport(),
        config().with_connect_timeout(Duration::from_secs(10)),
    );

    guest.connect_to_host("shadow-dex-ab12cd34").await.unwrap();
    assert_eq!(guest.state(), SyncState::Connecting);
    let err = guest.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Connection);
}

#[tokio::test]
async fn unavailable_rendezvous_is_a_signaling_error() {
    let hub = MemoryHub::new();
    hub.set_available(false);
    let host = engine(&hub, store(&[]));

    let err = host.start_hosting().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Signaling);
    assert_eq!(host.state().phase(), SyncPhase::Error);
    assert_eq!(host.stats().sessions_failed, 1);

    hub.set_available(true);
    host.start_hosting().await.unwrap();
    assert_eq!(host.state().phase(), SyncPhase::Waiting);
}

#[tokio::test]
async fn cancel_while_connecting() {
    let hub = MemoryHub::new();
    hub.set_join_delay(Duration::from_secs(60));
    let guest = engine(&hub, store(&[]));

    guest.connect_to_host("shadow-dex-ab12cd34").await.unwrap();
    assert!(guest.cancel());
    assert!(matches!(
        guest.state(),
        SyncState::Error {
            kind: SyncErrorKind::Cancelled,
            ..
        }
    ));
    guest.reset().unwrap();
    assert_eq!(guest.state(), SyncState::Idle);
}

#[tokio::test]
async fn closing_twice_and_restarting_is_harmless() {
    let hub = MemoryHub::new();
    let a = store(&[note("n1", 10)]);
    let b = store(&[]);
    let host = engine(&hub, a.clone());
    let guest = engine(&hub, b.clone());

    guest.connect_to_host("not-a-real-id").await.unwrap_err();
    assert!(!guest.cancel());
    guest.reset().unwrap();
    guest.reset().unwrap();
    assert_eq!(guest.state(), SyncState::Idle);

    for round in 0..2 {
        let id = host.start_hosting().await.unwrap();
        guest.connect_to_host(id.as_str()).await.unwrap();
        let report = guest.wait_for_completion().await.unwrap();
        host.wait_for_completion().await.unwrap();
        if round == 0 {
            assert_eq!(report.inserted, 1);
        } else {
            assert_eq!(report.kept, 1);
        }
        host.reset().unwrap();
        guest.reset().unwrap();
    }
    assert_eq!(contents(&a), contents(&b));
    assert_eq!(host.stats().sessions_completed, 2);
}

#[tokio::test]
async fn new_session_may_start_from_error() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[note("x", 1)]));
    let guest = engine(&hub, store(&[]));

    guest.connect_to_host("shadow-dex-nobody00").await.unwrap();
    guest.wait_for_completion().await.unwrap_err();

    let id = host.start_hosting().await.unwrap();
    guest.connect_to_host(id.as_str()).await.unwrap();
    assert_eq!(guest.wait_for_completion().await.unwrap().inserted, 1);
}

#[tokio::test]
async fn unknown_messages_are_ignored() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[]));
    let id = host.start_hosting().await.unwrap();
    let peer = hub.transport().join_session(&id).await.unwrap();

    let hello = Value::Map(vec![(Value::Text("type".into()), Value::Text("HELLO".into()))]);
    let bad_shape = Value::Map(vec![
        (Value::Text("type".into()), Value::Text("SYNC_DATA".into())),
        (Value::Text("entries".into()), Value::Integer(5.into())),
    ]);
    peer.send(cbor(&hello)).await.unwrap();
    peer.send(cbor(&bad_shape)).await.unwrap();
    peer.send(
        SyncMessage::sync_data(vec![note("k", 3)])
            .encode(DEFAULT_MAX_PAYLOAD_BYTES)
            .unwrap(),
    )
    .await
    .unwrap();

    let report = host.wait_for_completion().await.unwrap();
    assert_eq!(report.ignored_messages, 2);
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn garbage_is_a_payload_error() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[note("a", 1)]));
    let id = host.start_hosting().await.unwrap();
    let peer = hub.transport().join_session(&id).await.unwrap();

    peer.send(vec![0xff, 0x00, 0x13]).await.unwrap();
    let err = host.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Payload);
    assert_eq!(contents(host.database()), vec![("a".to_string(), 1)]);
}

#[tokio::test]
async fn peer_leaving_early_is_a_transport_error() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[]));
    let id = host.start_hosting().await.unwrap();
    let peer = hub.transport().join_session(&id).await.unwrap();

    peer.close();
    let err = host.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Transport);
}

#[tokio::test]
async fn oversized_local_payload_is_a_payload_error() {
    let hub = MemoryHub::new();
    let notes: Vec<Note> = (0..10).map(|i| note(&format!("n{i}"), i)).collect();
    let host = SyncEngine::new(
        store(&notes),
        hub.transport(),
        config().with_max_payload_bytes(64),
    );
    let id = host.start_hosting().await.unwrap();
    let _peer = hub.transport().join_session(&id).await.unwrap();

    let err = host.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Payload);
}

#[tokio::test]
async fn peer_gone_before_delivery_is_a_transport_error() {
    let hub = MemoryHub::new();
    let host = engine(&hub, store(&[note("a", 1)]));
    let id = host.start_hosting().await.unwrap();
    let peer = hub.transport().join_session(&id).await.unwrap();

    // The peer stops reading, hands over its notes and leaves.
    let (sender, inbound) = peer.into_parts();
    drop(inbound);
    let payload = SyncMessage::sync_data(vec![note("b", 2)])
        .encode(DEFAULT_MAX_PAYLOAD_BYTES)
        .unwrap();
    sender.send(payload).await.unwrap();
    drop(sender);

    let err = host.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Transport);
    assert_eq!(host.stats().sessions_completed, 0);
    assert_eq!(host.stats().sessions_failed, 1);
}

#[tokio::test]
async fn storage_failure_rolls_back_the_merge() {
    let fail = Arc::new(AtomicBool::new(false));
    let backend = FailingBackend {
        inner: InMemoryBackend::new(),
        fail: fail.clone(),
    };
    let db = Arc::new(Database::open_with_backend(Box::new(backend), Config::default()).unwrap());
    fail.store(true, Ordering::SeqCst);

    let hub = MemoryHub::new();
    let host = engine(&hub, db);
    let id = host.start_hosting().await.unwrap();
    let peer = hub.transport().join_session(&id).await.unwrap();

    let payload = SyncMessage::sync_data(vec![note("x", 1), note("y", 2)])
        .encode(DEFAULT_MAX_PAYLOAD_BYTES)
        .unwrap();
    peer.send(payload).await.unwrap();

    let err = host.wait_for_completion().await.unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::Storage);
    assert!(matches!(host.state(), SyncState::Error { kind: SyncErrorKind::Storage, .. }));
    assert_eq!(host.database().note_count(), 0);
    assert_eq!(host.stats().sessions_failed, 1);
}
