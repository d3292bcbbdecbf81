//! # Worker Channel Module
//!
//! Canale request/response verso un contesto di esecuzione in background
//! (un thread dedicato) che esegue lo stesso lavoro di resize del modulo
//! [`crate::resize`], fuori dal task che orchestra il batch.
//!
//! ## Protocollo
//! - Richiesta: `{ files: [{name, size, lastModified, path | bytes}, ...] }`;
//!   per gli handle su disco il worker legge i byte da sé
//! - Risposta: `{ thumbnails: [{name, url, id}, ...] }`, stesso ordine e
//!   stessa lunghezza della richiesta
//! - Ogni messaggio viaggia in una busta con `request_id`: il chiamante
//!   scarta le risposte che non corrispondono alla richiesta in attesa
//!
//! ## Ciclo di vita
//! - Il thread parte alla prima richiesta ([`WorkerChannel::process_chunk`])
//! - Viene riusato tra chunk e tra batch
//! - [`WorkerChannel::shutdown`] lo ferma; se muore viene riavviato alla
//!   richiesta successiva
//!
//! ## Single-flight
//! `process_chunk` prende `&mut self`, quindi al massimo una richiesta è in
//! volo per canale. La correlazione tramite `request_id` non dipende da
//! questo: una risposta tardiva di una richiesta abbandonata viene scartata.
//!
//! ## Payload malformati
//! Una risposta senza `thumbnails` (o non decodificabile) non blocca mai il
//! chiamante: `process_chunk` ritorna `UploadError::ChannelProtocol`. Lo
//! stesso vale per una risposta con più thumbnails che file richiesti; una
//! risposta più corta è un risultato parziale.

use crate::error::{UploadError, UploadResult};
use crate::file_manager::InputFile;
use crate::resize::ThumbnailResizer;
use crate::thumbnail::Thumbnail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wire format della richiesta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub files: Vec<InputFile>,
}

/// Wire format della risposta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug)]
struct RequestEnvelope {
    request_id: u64,
    message: RequestMessage,
}

#[derive(Debug)]
struct ResponseEnvelope {
    request_id: u64,
    payload: Value,
}

/// Logica eseguita nel contesto del worker, una chiamata per richiesta
pub trait ChunkResponder: Send {
    fn respond(&mut self, request: RequestMessage) -> Value;
}

/// Costruisce il responder quando il worker viene (ri)avviato
pub type ResponderFactory = Arc<dyn Fn() -> Box<dyn ChunkResponder> + Send + Sync>;

/// Responder di default: resize di ogni file con isolamento per item
pub struct ResizeResponder {
    resizer: ThumbnailResizer,
    max_retries: u32,
}

impl ResizeResponder {
    pub fn new(resizer: ThumbnailResizer, max_retries: u32) -> Self {
        Self {
            resizer,
            max_retries,
        }
    }
}

impl ChunkResponder for ResizeResponder {
    fn respond(&mut self, request: RequestMessage) -> Value {
        let thumbnails: Vec<Thumbnail> = request
            .files
            .iter()
            .map(|file| self.resizer.resize_settled_blocking(file, self.max_retries))
            .collect();

        match serde_json::to_value(ResponseMessage { thumbnails }) {
            Ok(value) => value,
            Err(e) => {
                warn!("Worker failed to serialize response: {}", e);
                Value::Null
            }
        }
    }
}

struct WorkerHandle {
    requests: mpsc::Sender<RequestEnvelope>,
    results: mpsc::Receiver<ResponseEnvelope>,
    thread: JoinHandle<()>,
}

/// Conduit asincrono verso il worker in background
pub struct WorkerChannel {
    factory: ResponderFactory,
    handle: Option<WorkerHandle>,
    next_request_id: u64,
}

impl WorkerChannel {
    /// Crea il canale senza avviare il worker
    pub fn new(factory: ResponderFactory) -> Self {
        Self {
            factory,
            handle: None,
            next_request_id: 0,
        }
    }

    /// Canale con il [`ResizeResponder`] di default
    pub fn with_resizer(resizer: ThumbnailResizer, max_retries: u32) -> Self {
        Self::new(Arc::new(move || {
            Box::new(ResizeResponder::new(resizer.clone(), max_retries)) as Box<dyn ChunkResponder>
        }))
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    fn ensure_started(&mut self) -> UploadResult<&mut WorkerHandle> {
        if self.handle.is_none() {
            let (request_tx, mut request_rx) = mpsc::channel::<RequestEnvelope>(1);
            let (result_tx, result_rx) = mpsc::channel::<ResponseEnvelope>(1);
            let mut responder = (self.factory)();

            let thread = std::thread::Builder::new()
                .name("thumbnail-worker".to_string())
                .spawn(move || {
                    while let Some(envelope) = request_rx.blocking_recv() {
                        debug!(
                            "Worker handling request {} ({} files)",
                            envelope.request_id,
                            envelope.message.files.len()
                        );
                        let payload = responder.respond(envelope.message);
                        let response = ResponseEnvelope {
                            request_id: envelope.request_id,
                            payload,
                        };
                        if result_tx.blocking_send(response).is_err() {
                            break;
                        }
                    }
                    debug!("Worker thread stopped");
                })?;

            info!("🧵 Background worker started");
            self.handle = Some(WorkerHandle {
                requests: request_tx,
                results: result_rx,
                thread,
            });
        }

        self.handle
            .as_mut()
            .ok_or_else(|| UploadError::WorkerUnavailable("worker not started".to_string()))
    }

    /// Invia un chunk e attende la risposta correlata
    pub async fn process_chunk(&mut self, files: Vec<InputFile>) -> UploadResult<Vec<Thumbnail>> {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let expected = files.len();

        let handle = self.ensure_started()?;
        let envelope = RequestEnvelope {
            request_id,
            message: RequestMessage { files },
        };

        if handle.requests.send(envelope).await.is_err() {
            self.handle = None;
            return Err(UploadError::WorkerUnavailable(
                "worker stopped accepting requests".to_string(),
            ));
        }

        loop {
            match handle.results.recv().await {
                Some(response) if response.request_id == request_id => {
                    let thumbnails = Self::decode_response(response.payload)?;
                    if thumbnails.len() > expected {
                        return Err(UploadError::ChannelProtocol(format!(
                            "{} thumbnails for {} files",
                            thumbnails.len(),
                            expected
                        )));
                    }
                    if thumbnails.len() < expected {
                        warn!(
                            "Worker returned {} thumbnails for {} files",
                            thumbnails.len(),
                            expected
                        );
                    }
                    return Ok(thumbnails);
                }
                Some(response) => {
                    debug!(
                        "Discarding stale worker response {} (waiting for {})",
                        response.request_id, request_id
                    );
                }
                None => {
                    self.handle = None;
                    return Err(UploadError::WorkerUnavailable(
                        "worker exited before replying".to_string(),
                    ));
                }
            }
        }
    }

    /// Valida il payload: serve un array `thumbnails` di elementi ben formati
    pub fn decode_response(payload: Value) -> UploadResult<Vec<Thumbnail>> {
        let thumbnails = match payload {
            Value::Object(mut map) => map.remove("thumbnails"),
            _ => None,
        };

        match thumbnails {
            Some(value @ Value::Array(_)) => serde_json::from_value(value).map_err(|e| {
                UploadError::ChannelProtocol(format!("malformed thumbnail entry: {}", e))
            }),
            Some(other) => Err(UploadError::ChannelProtocol(format!(
                "`thumbnails` is not a sequence: {}",
                other
            ))),
            None => Err(UploadError::ChannelProtocol(
                "response has no `thumbnails` field".to_string(),
            )),
        }
    }

    /// Ferma il worker e attende la fine del thread
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let WorkerHandle {
                requests,
                results,
                thread,
            } = handle;
            drop(requests);
            drop(results);
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => info!("🧵 Background worker stopped"),
                Ok(Err(_)) => warn!("Background worker panicked"),
                Err(e) => warn!("Failed to join background worker: {}", e),
            }
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("Dropping worker channel, thread will exit after its current request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resize::tests::png_file;
    use crate::resize::ResizeTarget;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fixed(payload: Value) -> ResponderFactory {
        struct Fixed(Value);
        impl ChunkResponder for Fixed {
            fn respond(&mut self, _request: RequestMessage) -> Value {
                self.0.clone()
            }
        }
        Arc::new(move || Box::new(Fixed(payload.clone())) as Box<dyn ChunkResponder>)
    }

    /// Echo dei nomi, con ritardo opzionale e panico su "panic.png"
    struct Echo {
        delay_first: Option<Duration>,
    }

    impl ChunkResponder for Echo {
        fn respond(&mut self, request: RequestMessage) -> Value {
            if let Some(delay) = self.delay_first.take() {
                std::thread::sleep(delay);
            }
            let thumbnails: Vec<Thumbnail> = request
                .files
                .iter()
                .map(|f| {
                    assert_ne!(f.name, "panic.png");
                    Thumbnail::new(f, format!("data:text/plain;base64,{}", f.name))
                })
                .collect();
            json!({ "thumbnails": thumbnails })
        }
    }

    fn echo_factory(starts: Arc<AtomicUsize>, delay_first: Option<Duration>) -> ResponderFactory {
        Arc::new(move || {
            starts.fetch_add(1, Ordering::SeqCst);
            Box::new(Echo { delay_first }) as Box<dyn ChunkResponder>
        })
    }

    fn names(thumbnails: &[Thumbnail]) -> Vec<&str> {
        thumbnails.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_lazy_start_and_reuse() {
        let starts = Arc::new(AtomicUsize::new(0));
        let mut channel = WorkerChannel::new(echo_factory(starts.clone(), None));
        assert!(!channel.is_started());
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        let first = channel
            .process_chunk(vec![png_file("a.png", 4, 4), png_file("b.png", 4, 4)])
            .await
            .unwrap();
        let second = channel
            .process_chunk(vec![png_file("c.png", 4, 4)])
            .await
            .unwrap();

        assert!(channel.is_started());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(names(&first), vec!["a.png", "b.png"]);
        assert_eq!(names(&second), vec!["c.png"]);

        channel.shutdown().await;
        assert!(!channel.is_started());
    }

    #[tokio::test]
    async fn test_real_resize_preserves_order() {
        let resizer = ThumbnailResizer::new(ResizeTarget::Square(8));
        let mut channel = WorkerChannel::with_resizer(resizer, 1);
        let files = vec![
            png_file("a.png", 32, 16),
            png_file("b.png", 16, 32),
            png_file("c.png", 4, 4),
        ];

        let thumbnails = channel.process_chunk(files.clone()).await.unwrap();
        assert_eq!(names(&thumbnails), vec!["a.png", "b.png", "c.png"]);
        for (thumb, file) in thumbnails.iter().zip(&files) {
            assert_eq!(thumb.id, Thumbnail::id_for(file));
            assert!(thumb.url.starts_with("data:image/png;base64,"));
        }
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn test_corrupt_item_becomes_placeholder() {
        let resizer = ThumbnailResizer::new(ResizeTarget::Square(8));
        let mut channel = WorkerChannel::with_resizer(resizer, 0);
        let files = vec![
            png_file("a.png", 8, 8),
            InputFile::from_bytes("bad.png", 1, b"garbage".to_vec()),
            png_file("c.png", 8, 8),
        ];

        let thumbnails = channel.process_chunk(files).await.unwrap();
        assert_eq!(thumbnails.len(), 3);
        assert!(!thumbnails[0].is_placeholder());
        assert!(thumbnails[1].is_placeholder());
        assert!(!thumbnails[2].is_placeholder());
    }

    #[tokio::test]
    async fn test_malformed_response_does_not_hang() {
        let mut channel = WorkerChannel::new(fixed(json!({})));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            channel.process_chunk(vec![png_file("a.png", 4, 4)]),
        )
        .await
        .expect("worker channel hung on malformed response");

        assert!(matches!(result, Err(UploadError::ChannelProtocol(_))));

        // the channel stays usable after a protocol failure
        let again = channel.process_chunk(vec![png_file("b.png", 4, 4)]).await;
        assert!(matches!(again, Err(UploadError::ChannelProtocol(_))));
    }

    #[tokio::test]
    async fn test_reply_longer_than_request_is_protocol_error() {
        struct Doubling;
        impl ChunkResponder for Doubling {
            fn respond(&mut self, request: RequestMessage) -> Value {
                let thumbnails: Vec<Thumbnail> = request
                    .files
                    .iter()
                    .flat_map(|f| {
                        let thumb = Thumbnail::new(f, "data:,".to_string());
                        [thumb.clone(), thumb]
                    })
                    .collect();
                json!({ "thumbnails": thumbnails })
            }
        }
        let mut channel =
            WorkerChannel::new(Arc::new(|| Box::new(Doubling) as Box<dyn ChunkResponder>));

        let result = channel
            .process_chunk(vec![png_file("a.png", 4, 4), png_file("b.png", 4, 4)])
            .await;
        assert!(matches!(result, Err(UploadError::ChannelProtocol(_))));
        channel.shutdown().await;
    }

    #[test]
    fn test_decode_response_variants() {
        assert!(WorkerChannel::decode_response(json!({ "thumbnails": [] }))
            .unwrap()
            .is_empty());
        assert!(WorkerChannel::decode_response(json!({ "thumbnails": 5 })).is_err());
        assert!(WorkerChannel::decode_response(json!({ "thumbs": [] })).is_err());
        assert!(WorkerChannel::decode_response(json!([1, 2, 3])).is_err());
        assert!(WorkerChannel::decode_response(json!({ "thumbnails": [{ "name": 1 }] })).is_err());

        let ok = WorkerChannel::decode_response(json!({
            "thumbnails": [{ "id": "a_1_1", "name": "a.png", "url": "data:," }]
        }))
        .unwrap();
        assert_eq!(ok[0].name, "a.png");
        assert!(ok[0].tag.is_none());
    }

    #[tokio::test]
    async fn test_late_response_of_abandoned_request_is_discarded() {
        let starts = Arc::new(AtomicUsize::new(0));
        let mut channel = WorkerChannel::new(echo_factory(
            starts.clone(),
            Some(Duration::from_millis(300)),
        ));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            channel.process_chunk(vec![png_file("old.png", 4, 4)]),
        )
        .await;
        assert!(abandoned.is_err());

        let fresh = channel
            .process_chunk(vec![png_file("new.png", 4, 4)])
            .await
            .unwrap();
        assert_eq!(names(&fresh), vec!["new.png"]);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_worker_is_restarted() {
        let starts = Arc::new(AtomicUsize::new(0));
        let mut channel = WorkerChannel::new(echo_factory(starts.clone(), None));

        let crashed = channel.process_chunk(vec![png_file("panic.png", 4, 4)]).await;
        assert!(matches!(crashed, Err(UploadError::WorkerUnavailable(_))));
        assert!(!channel.is_started());

        let recovered = channel
            .process_chunk(vec![png_file("ok.png", 4, 4)])
            .await
            .unwrap();
        assert_eq!(names(&recovered), vec!["ok.png"]);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }
}
