// Shared fakes for unit tests: an in-process HTTP stub, a scripted vision
// provider, a fixed-size screen capture and an in-memory ledger.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::display::topology::normalize;
use crate::display::transform::CoordinateTransformer;
use crate::display::types::{Display, OriginFrame, RawDisplay};
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::history::ledger::LedgerStore;
use crate::history::types::AppClickHistory;
use crate::llm::provider::VisionProvider;
use crate::llm::types::{ProviderRoute, VisionRequest};
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{CaptureRegion, CapturedImage};

pub struct StubServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request bodies received so far, in order.
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

pub fn json_response(status: u16, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

pub fn sse_response(events: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{events}")
}

/// Serves the scripted responses in order, one per connection; the last one
/// repeats once the script runs out.
pub async fn spawn_stub(responses: Vec<String>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));

    let hits_task = hits.clone();
    let bodies_task = bodies.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let n = hits_task.fetch_add(1, Ordering::SeqCst);
            let response = responses
                .get(n)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_else(|| json_response(500, "{}"));
            let body = read_request(&mut socket).await;
            if let Ok(mut b) = bodies_task.lock() {
                b.push(body);
            }
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    StubServer {
        url: format!("http://{addr}"),
        hits,
        bodies,
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
            }
        }
    }
    String::new()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ── Domain fakes ────────────────────────────────────────────────────────────

pub fn raw_display(name: &str, is_main: bool, width: u32, height: u32, origin: (i32, i32), scale: f64) -> RawDisplay {
    RawDisplay {
        name: name.into(),
        is_main,
        width,
        height,
        origin_x: origin.0,
        origin_y: origin.1,
        scale_factor: scale,
        frame: OriginFrame::TopLeft,
    }
}

pub fn transformer(raw: Vec<RawDisplay>) -> CoordinateTransformer {
    CoordinateTransformer::new(Arc::new(normalize(raw)))
}

pub fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([30, 30, 30, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Answers every capture with a blank image at device resolution.
#[derive(Default)]
pub struct FixedCapture {
    calls: AtomicUsize,
}

impl FixedCapture {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenCapture for FixedCapture {
    async fn capture(&self, display: &Display, region: Option<CaptureRegion>) -> ScreenPointResult<CapturedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = region.map_or((display.width, display.height), |r| (r.width, r.height));
        let width = (w as f64 * display.scale_factor).round() as u32;
        let height = (h as f64 * display.scale_factor).round() as u32;
        Ok(CapturedImage {
            bytes: blank_png(width, height),
            width,
            height,
            display_index: display.index,
            region,
            captured_at: Instant::now(),
        })
    }
}

/// Replays canned replies in order and records every prompt it sees.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScreenPointResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScreenPointResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn route(&self) -> ProviderRoute {
        ProviderRoute::Messages
    }

    async fn complete(&self, request: &VisionRequest) -> ScreenPointResult<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ScreenPointError::InvalidRequest("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    ledgers: Mutex<HashMap<String, AppClickHistory>>,
}

impl MemoryLedger {
    pub fn stored(&self, app_name: &str) -> Option<AppClickHistory> {
        self.ledgers.lock().unwrap().get(app_name).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn read(&self, app_name: &str) -> ScreenPointResult<Option<AppClickHistory>> {
        Ok(self.stored(app_name))
    }

    async fn write(&self, history: &AppClickHistory) -> ScreenPointResult<()> {
        self.ledgers.lock().unwrap().insert(history.app_name.clone(), history.clone());
        Ok(())
    }

    async fn delete(&self, app_name: &str) -> ScreenPointResult<()> {
        self.ledgers.lock().unwrap().remove(app_name);
        Ok(())
    }
}
