use std::time::Duration;

use ofdview_protocol::{RequestId, ViewMessage};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::config::SourcePolicy;
use crate::document::DocumentState;
use crate::source::MemorySource;

fn file_uri(name: &str) -> DocumentUri {
	DocumentUri::parse(&format!("file:///docs/{name}")).unwrap()
}

fn setup(config: SyncConfig) -> (SyncProvider, Arc<MemorySource>) {
	let source = Arc::new(MemorySource::new());
	let provider = SyncProvider::new(source.clone(), config);
	(provider, source)
}

async fn open(provider: &SyncProvider, source: &MemorySource, name: &str, bytes: Vec<u8>) -> Arc<OfdDocument> {
	let uri = file_uri(name);
	source.insert(uri.clone(), bytes);
	provider.open_custom_document(uri, OpenContext::default()).await.unwrap()
}

/// Attaches a view whose inbound side is driven by calling `handle_message` directly.
fn attach(provider: &SyncProvider, document: &OfdDocument) -> (ViewHandle, ViewPort) {
	let (view, _inbox, port) = provider.create_view();
	provider.attach_view(document, &view).unwrap();
	(view, port)
}

fn ready(provider: &SyncProvider, document: &OfdDocument, view: &ViewHandle) {
	provider.handle_message(document, view, Envelope::new(kind::READY));
}

/// Sends `ready` through a pumped view's port and consumes the `init` reply.
async fn handshake(port: &mut ViewPort) {
	port.post(Envelope::new(kind::READY)).unwrap();
	assert_eq!(port.recv().await.unwrap().kind, kind::INIT);
}

fn drain(port: &mut ViewPort) -> Vec<Envelope> {
	std::iter::from_fn(|| port.try_recv()).collect()
}

/// Answers the next `getFileData` request on `port` with `data`.
async fn answer(port: &mut ViewPort, data: &[u8]) -> RequestId {
	let request = port.recv().await.unwrap();
	assert_eq!(request.kind, kind::GET_FILE_DATA);
	let id = request.request_id.unwrap();
	port.post(ViewMessage::file_data(id, data).into_envelope()).unwrap();
	id
}

#[tokio::test]
async fn untitled_document_gets_untitled_init() {
	let (provider, _source) = setup(SyncConfig::default());
	let uri = DocumentUri::untitled("Untitled-1").unwrap();
	let document = provider.open_custom_document(uri, OpenContext::default()).await.unwrap();
	assert!(document.content().is_empty());

	let (view, mut port) = attach(&provider, &document);
	assert_eq!(document.state(), DocumentState::Opening);
	ready(&provider, &document, &view);

	let init = port.try_recv().unwrap();
	assert_eq!(init.kind, kind::INIT);
	assert_eq!(init.body, Some(json!({ "untitled": true, "editable": true })));
	assert_eq!(document.state(), DocumentState::Ready);
}

#[tokio::test]
async fn read_only_storage_gives_non_editable_init() {
	let (provider, source) = setup(SyncConfig::default());
	source.set_writable("file", false);
	let document = open(&provider, &source, "ro.ofd", vec![1, 2, 3]).await;

	let (view, mut port) = attach(&provider, &document);
	ready(&provider, &document, &view);

	let init = port.try_recv().unwrap();
	assert_eq!(init.body, Some(json!({ "value": [1, 2, 3], "editable": false })));
}

#[tokio::test]
async fn second_view_is_initialized_with_current_bytes() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "a.ofd", vec![10; 10]).await;

	let (first, mut first_port) = attach(&provider, &document);
	ready(&provider, &document, &first);
	assert_eq!(
		drain(&mut first_port).pop().unwrap().body,
		Some(json!({ "value": vec![10u8; 10], "editable": true }))
	);

	document.replace_content(Bytes::from(vec![20u8; 20])).unwrap();
	let updates = drain(&mut first_port);
	assert_eq!(updates.len(), 1);
	assert_eq!(updates[0].kind, kind::UPDATE);
	assert_eq!(updates[0].body, Some(json!({ "content": vec![20u8; 20] })));

	let (second, mut second_port) = attach(&provider, &document);
	ready(&provider, &document, &second);
	let init = drain(&mut second_port);
	assert_eq!(init.len(), 1);
	assert_eq!(init[0].body, Some(json!({ "value": vec![20u8; 20], "editable": true })));
	assert!(drain(&mut first_port).is_empty());
}

#[tokio::test]
async fn content_change_reaches_every_view_once() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "fan.ofd", vec![0]).await;

	// No views yet: a change is a no-op for the transport.
	document.replace_content(Bytes::from_static(b"zero")).unwrap();

	let mut ports: Vec<_> = (0..3).map(|_| attach(&provider, &document)).collect();
	document.replace_content(Bytes::from_static(b"new")).unwrap();

	for (_view, port) in &mut ports {
		let received = drain(port);
		assert_eq!(received.len(), 1);
		assert_eq!(received[0].body, Some(json!({ "content": b"new".to_vec() })));
	}

	// Closed views are skipped.
	ports[0].0.close();
	document.replace_content(Bytes::from_static(b"again")).unwrap();
	assert!(drain(&mut ports[0].1).is_empty());
	assert_eq!(drain(&mut ports[1].1).len(), 1);
	assert_eq!(drain(&mut ports[2].1).len(), 1);
}

#[tokio::test]
async fn duplicate_ready_does_not_resend_init() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "dup.ofd", vec![1]).await;
	let (view, mut port) = attach(&provider, &document);

	ready(&provider, &document, &view);
	ready(&provider, &document, &view);
	assert_eq!(drain(&mut port).len(), 1);
}

#[tokio::test]
async fn reply_with_unknown_id_is_ignored() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "u.ofd", vec![1]).await;
	let (view, mut port) = attach(&provider, &document);

	let stray = ViewMessage::file_data(RequestId(42), &[9]).into_envelope();
	provider.handle_message(&document, &view, stray);
	assert_eq!(provider.outstanding_requests(), 0);
	assert!(drain(&mut port).is_empty());
	assert_eq!(document.content(), Bytes::from_static(&[1]));
}

#[tokio::test]
async fn fetch_routes_reply_and_ids_increase() {
	let (provider, source) = setup(SyncConfig::default());
	let a = open(&provider, &source, "a.ofd", vec![1]).await;
	let b = open(&provider, &source, "b.ofd", vec![2]).await;

	let (va, inbox_a, mut port_a) = provider.create_view();
	let (vb, inbox_b, mut port_b) = provider.create_view();
	let _pump_a = provider.resolve_custom_editor(a.clone(), va, inbox_a).unwrap();
	let _pump_b = provider.resolve_custom_editor(b.clone(), vb, inbox_b).unwrap();
	handshake(&mut port_a).await;
	handshake(&mut port_b).await;

	let (data, id1) = tokio::join!(provider.fetch_file_data(a.uri()), answer(&mut port_a, &[4, 5]));
	assert_eq!(data.unwrap(), Bytes::from_static(&[4, 5]));

	let (data, id2) = tokio::join!(provider.fetch_file_data(b.uri()), answer(&mut port_b, &[6]));
	assert_eq!(data.unwrap(), Bytes::from_static(&[6]));

	let (_, id3) = tokio::join!(provider.fetch_file_data(a.uri()), answer(&mut port_a, &[]));
	assert_eq!((id1, id2, id3), (RequestId(1), RequestId(2), RequestId(3)));
	assert_eq!(provider.outstanding_requests(), 0);
}

#[tokio::test]
async fn closing_only_view_leaves_no_source() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "close.ofd", vec![1]).await;
	let (view, _port) = attach(&provider, &document);

	view.close();
	assert!(provider.views().get(document.uri()).is_empty());
	let err = document.get_file_data().await.unwrap_err();
	assert!(matches!(err, Error::NoViewAvailable(uri) if uri == *document.uri()));
}

#[tokio::test]
async fn sync_from_view_pulls_then_fans_out() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "sync.ofd", vec![1]).await;
	let (view, inbox, mut port) = provider.create_view();
	let _pump = provider.resolve_custom_editor(document.clone(), view, inbox).unwrap();
	handshake(&mut port).await;

	let (synced, _) = tokio::join!(provider.sync_from_view(&document), answer(&mut port, &[7, 7, 7]));
	assert_eq!(synced.unwrap(), Bytes::from_static(&[7, 7, 7]));
	assert_eq!(document.content(), Bytes::from_static(&[7, 7, 7]));

	let update = port.recv().await.unwrap();
	assert_eq!(update.kind, kind::UPDATE);
	assert_eq!(update.body, Some(json!({ "content": [7, 7, 7] })));
}

#[tokio::test]
async fn save_revert_and_backup_are_unimplemented() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "save.ofd", vec![3, 4]).await;
	let (view, _port) = attach(&provider, &document);
	ready(&provider, &document, &view);
	let target = file_uri("copy.ofd");

	assert!(matches!(
		provider.save_custom_document(&document).await,
		Err(Error::Unimplemented("saveCustomDocument"))
	));
	assert!(matches!(
		provider.save_custom_document_as(&document, &target).await,
		Err(Error::Unimplemented(_))
	));
	assert!(matches!(
		provider.revert_custom_document(&document).await,
		Err(Error::Unimplemented(_))
	));
	assert!(matches!(
		provider.backup_custom_document(&document, &target).await,
		Err(Error::Unimplemented(_))
	));

	assert_eq!(document.content(), Bytes::from_static(&[3, 4]));
	assert_eq!(document.state(), DocumentState::Ready);
	assert_eq!(provider.views().get(document.uri()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
	let config = SyncConfig {
		request_timeout_secs: 5,
		..SyncConfig::default()
	};
	let (provider, source) = setup(config);
	let document = open(&provider, &source, "slow.ofd", vec![1]).await;
	let (view, mut port) = attach(&provider, &document);
	ready(&provider, &document, &view);
	drain(&mut port);

	let started = tokio::time::Instant::now();
	let err = provider.fetch_file_data(document.uri()).await.unwrap_err();
	assert!(matches!(err, Error::RequestTimeout(RequestId(1))));
	assert!(started.elapsed() >= Duration::from_secs(5));
	assert_eq!(provider.outstanding_requests(), 0);
}

#[tokio::test]
async fn closing_view_fails_its_pending_request() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "gone.ofd", vec![1]).await;
	let (view, mut port) = attach(&provider, &document);
	ready(&provider, &document, &view);
	drain(&mut port);

	let close = async {
		let request = port.recv().await.unwrap();
		assert_eq!(request.kind, kind::GET_FILE_DATA);
		view.close();
	};
	let (result, ()) = tokio::join!(provider.fetch_file_data(document.uri()), close);
	assert!(matches!(result, Err(Error::ViewClosed(id)) if id == view.id()));
	assert_eq!(provider.outstanding_requests(), 0);
}

#[tokio::test]
async fn policy_selects_authoritative_view() {
	let config = SyncConfig {
		source_policy: SourcePolicy::FirstRegistered,
		..SyncConfig::default()
	};
	let (provider, source) = setup(config);
	let document = open(&provider, &source, "multi.ofd", vec![1]).await;
	let (first, _p1) = attach(&provider, &document);
	let (second, _p2) = attach(&provider, &document);
	ready(&provider, &document, &first);
	ready(&provider, &document, &second);
	provider.views().mark_active(second.id());

	let chosen = provider.views().authoritative(document.uri(), provider.config().source_policy);
	assert_eq!(chosen.map(|v| v.id()), Some(first.id()));

	let chosen = provider.views().authoritative(document.uri(), SourcePolicy::MostRecentlyActive);
	assert_eq!(chosen.map(|v| v.id()), Some(second.id()));
}

#[tokio::test]
async fn edit_marks_dirty_and_activates_view() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "edit.ofd", vec![1]).await;
	let (first, _p1) = attach(&provider, &document);
	let (second, _p2) = attach(&provider, &document);
	ready(&provider, &document, &first);
	ready(&provider, &document, &second);

	let events = Arc::new(Mutex::new(Vec::new()));
	let sink = events.clone();
	let _sub = provider.on_did_change_custom_document(move |event| {
		sink.lock().push((event.uri.clone(), event.edit.label.clone()));
	});

	let edit = Envelope::new(kind::EDIT).with_body(json!({ "label": "Rotate page" }));
	provider.handle_message(&document, &first, edit);

	let events = events.lock().clone();
	assert_eq!(events, vec![(document.uri().clone(), "Rotate page".to_string())]);
	let chosen = provider.views().authoritative(document.uri(), SourcePolicy::MostRecentlyActive);
	assert_eq!(chosen.map(|v| v.id()), Some(first.id()));
}

#[tokio::test]
async fn view_error_is_reported_not_fatal() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "bad.ofd", vec![0xff]).await;
	let (view, _port) = attach(&provider, &document);

	let reports = Arc::new(Mutex::new(Vec::new()));
	let sink = reports.clone();
	let _sub = provider.on_did_report_error(move |report| sink.lock().push(report.clone()));

	let error = ViewMessage::OpenOfdError {
		error: "not an ofd container".into(),
	};
	provider.handle_message(&document, &view, error.into_envelope());

	let reports = reports.lock().clone();
	assert_eq!(
		reports,
		vec![ViewErrorReport {
			uri: document.uri().clone(),
			view: view.id(),
			message: "not an ofd container".into(),
		}]
	);
	assert!(!view.is_closed());
	assert!(!document.is_disposed());
}

#[tokio::test]
async fn disposed_document_sends_nothing() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "done.ofd", vec![1]).await;
	let (view, mut port) = attach(&provider, &document);

	document.dispose();
	ready(&provider, &document, &view);
	assert!(document.replace_content(Bytes::from_static(b"x")).is_err());
	assert!(drain(&mut port).is_empty());

	let (late, _inbox, _port) = provider.create_view();
	assert!(matches!(provider.attach_view(&document, &late), Err(Error::Disposed(_))));
}

#[tokio::test]
async fn backup_bytes_take_precedence() {
	let (provider, source) = setup(SyncConfig::default());
	let uri = file_uri("restored.ofd");
	let backup = file_uri("restored.ofd.bak");
	source.insert(uri.clone(), vec![1]);
	source.insert(backup.clone(), vec![2, 2]);

	let context = OpenContext { backup: Some(backup) };
	let document = provider.open_custom_document(uri, context).await.unwrap();
	assert_eq!(document.content(), Bytes::from_static(&[2, 2]));
}

#[tokio::test]
async fn storage_failure_aborts_open() {
	let (provider, _source) = setup(SyncConfig::default());
	let err = provider
		.open_custom_document(file_uri("missing.ofd"), OpenContext::default())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::StorageRead { .. }));
}

#[tokio::test]
async fn pump_closes_view_when_port_goes_away() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "pump.ofd", vec![5]).await;
	let (view, inbox, mut port) = provider.create_view();
	let pump = provider.resolve_custom_editor(document.clone(), view.clone(), inbox).unwrap();

	assert!(port.bootstrap().is_some());
	port.post(ViewMessage::Ready.into_envelope()).unwrap();
	let init = port.recv().await.unwrap();
	assert_eq!(init.kind, kind::INIT);

	drop(port);
	pump.await.unwrap();
	assert!(view.is_closed());
	assert!(provider.views().is_empty());
}

#[tokio::test]
async fn document_outliving_provider_reports_stopped() {
	let source = Arc::new(MemorySource::new());
	let uri = file_uri("orphan.ofd");
	source.insert(uri.clone(), vec![1]);
	let provider = SyncProvider::new(source, SyncConfig::default());
	let document = provider.open_custom_document(uri, OpenContext::default()).await.unwrap();

	drop(provider);
	assert!(matches!(document.get_file_data().await, Err(Error::ServiceStopped)));
}

#[tokio::test]
async fn fresh_view_cannot_overwrite_edited_content() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "edited.ofd", vec![1, 2]).await;
	let (edited, mut edited_port) = attach(&provider, &document);
	ready(&provider, &document, &edited);
	drain(&mut edited_port);
	let edit = Envelope::new(kind::EDIT).with_body(json!({ "label": "Stamp" }));
	provider.handle_message(&document, &edited, edit);

	let (fresh, mut fresh_port) = attach(&provider, &document);
	assert!(!fresh.is_initialized());

	let (synced, _) = tokio::join!(provider.sync_from_view(&document), answer(&mut edited_port, &[9, 9]));
	assert_eq!(synced.unwrap(), Bytes::from_static(&[9, 9]));
	assert_eq!(document.content(), Bytes::from_static(&[9, 9]));
	assert!(drain(&mut fresh_port).iter().all(|m| m.kind == kind::UPDATE));

	fresh.close();
	edited.close();
	let err = document.get_file_data().await.unwrap_err();
	assert!(matches!(err, Error::NoViewAvailable(_)));
}

#[tokio::test]
async fn no_initialized_view_means_no_source() {
	let (provider, source) = setup(SyncConfig::default());
	let document = open(&provider, &source, "early.ofd", vec![1]).await;
	let (_view, mut port) = attach(&provider, &document);

	let err = provider.fetch_file_data(document.uri()).await.unwrap_err();
	assert!(matches!(err, Error::NoViewAvailable(_)));
	assert!(drain(&mut port).is_empty());
	assert_eq!(provider.outstanding_requests(), 0);
}

#[tokio::test]
async fn reattaching_a_view_keeps_one_dispose_hook() {
	let (provider, source) = setup(SyncConfig::default());
	let a = open(&provider, &source, "a.ofd", vec![1]).await;
	let b = open(&provider, &source, "b.ofd", vec![2]).await;
	let (view, _inbox, _port) = provider.create_view();

	for document in [&a, &b, &b, &a] {
		provider.attach_view(document, &view).unwrap();
		assert_eq!(view.dispose_listener_count(), 1);
	}
	assert!(provider.views().remove(view.id()));
	assert_eq!(view.dispose_listener_count(), 0);
}
