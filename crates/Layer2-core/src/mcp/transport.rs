//! MCP Transport - 게이트웨이 전송 계층
//!
//! - Stdio (pull): 자식 프로세스와 stdin/stdout 줄 단위 JSON-RPC
//! - SSE (push): Server-Sent Events로 응답을 받고 HTTP POST로 요청을 보낸다
//!
//! 두 전송 모두 응답을 id로 대기 중인 요청에 돌려준다. 응답이 제한 시간 안에
//! 오지 않으면 `Error::Timeout`.

use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use skein_foundation::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

/// SSE 서버가 `endpoint` 이벤트를 보낼 때까지 기다리는 시간
const ENDPOINT_WAIT: Duration = Duration::from_secs(2);

/// 전송 계약
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// 요청 전송 및 응답 대기
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// 알림 전송 (응답 없음)
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

// ============================================================================
// Pending - id별 응답 대기열
// ============================================================================

#[derive(Clone, Default)]
struct Pending {
    waiters: Arc<RwLock<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    next_id: Arc<AtomicU64>,
}

impl Pending {
    async fn register(&self) -> (u64, oneshot::Receiver<JsonRpcResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.write().await.insert(id, tx);
        (id, rx)
    }

    async fn forget(&self, id: u64) {
        self.waiters.write().await.remove(&id);
    }

    /// 수신한 텍스트 한 건을 대기자에게 전달
    async fn route(&self, text: &str) {
        match serde_json::from_str::<JsonRpcResponse>(text) {
            Ok(response) if response.id.is_some() => {
                let id = response.id.unwrap_or_default();
                if let Some(sender) = self.waiters.write().await.remove(&id) {
                    let _ = sender.send(response);
                }
            }
            Ok(_) => debug!("Ignoring server notification: {}", text),
            Err(e) => debug!("Ignoring non JSON-RPC message: {}", e),
        }
    }

    /// 연결이 끊기면 모든 대기자를 깨운다 (채널 닫힘)
    async fn fail_all(&self) {
        self.waiters.write().await.clear();
    }

    async fn wait(
        &self,
        id: u64,
        method: &str,
        rx: oneshot::Receiver<JsonRpcResponse>,
        timeout: Duration,
    ) -> Result<Value> {
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(Error::Mcp(format!(
                    "connection closed while waiting for '{}'",
                    method
                )))
            }
            Err(_) => {
                self.forget(id).await;
                return Err(Error::Timeout(format!(
                    "no response to '{}' within {}ms",
                    method,
                    timeout.as_millis()
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(Error::Mcp(format!(
                "'{}' failed with {}: {}",
                method, error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

// ============================================================================
// Stdio Transport
// ============================================================================

/// 자식 프로세스 기반 전송
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin_tx: mpsc::Sender<String>,
    pending: Pending,
    connected: Arc<AtomicBool>,
    timeout: Duration,
}

impl StdioTransport {
    /// 프로세스 시작
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        info!("Spawning MCP process: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Mcp(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Mcp("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Mcp("failed to capture stdout".to_string()))?;
        let stderr = child.stderr.take();

        let pending = Pending::default();
        let connected = Arc::new(AtomicBool::new(true));
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);

        // stdin writer
        let connected_w = Arc::clone(&connected);
        let mut writer = stdin;
        tokio::spawn(async move {
            while let Some(msg) = stdin_rx.recv().await {
                let written = async {
                    writer.write_all(msg.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("MCP stdin write failed: {}", e);
                    connected_w.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // stdout reader
        let connected_r = Arc::clone(&connected);
        let pending_r = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    pending_r.route(&line).await;
                }
            }
            connected_r.store(false, Ordering::SeqCst);
            pending_r.fail_all().await;
            debug!("MCP stdout reader finished");
        });

        // stderr는 로그로만
        if let Some(stderr) = stderr {
            let name = command.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", name, line);
                }
            });
        }

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin_tx,
            pending,
            connected,
            timeout,
        })
    }

    async fn send_line(&self, payload: String) -> Result<()> {
        self.stdin_tx
            .send(format!("{}\n", payload))
            .await
            .map_err(|_| Error::Mcp("process stdin closed".to_string()))
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Mcp("stdio transport not connected".to_string()));
        }

        let (id, rx) = self.pending.register().await;
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        debug!("MCP request: {}", payload);

        if let Err(e) = self.send_line(payload).await {
            self.pending.forget(id).await;
            return Err(e);
        }
        self.pending.wait(id, method, rx, self.timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Mcp("stdio transport not connected".to_string()));
        }
        let payload = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.send_line(payload).await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        self.pending.fail_all().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SSE Transport
// ============================================================================

/// Server-Sent Events 기반 전송
pub struct SseTransport {
    client: reqwest::Client,
    message_url: String,
    pending: Pending,
    connected: Arc<AtomicBool>,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
    timeout: Duration,
}

impl SseTransport {
    /// SSE 스트림 연결
    ///
    /// 서버가 `endpoint` 이벤트로 메시지 URL을 알려주면 그 주소를,
    /// 아니면 `{base}/messages`를 쓴다.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!("Connecting to MCP SSE server: {}", url);

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let mut source = reqwest_eventsource::EventSource::new(client.get(url))
            .map_err(|e| Error::Mcp(format!("cannot open event stream: {}", e)))?;

        let pending = Pending::default();
        let connected = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<String, String>>();

        let base = url.to_string();
        let pending_l = pending.clone();
        let connected_l = Arc::clone(&connected);
        let listener = tokio::spawn(async move {
            use reqwest_eventsource::Event;

            let mut ready = Some(ready_tx);
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => debug!("SSE stream opened: {}", base),
                    Ok(Event::Message(message)) if message.event == "endpoint" => {
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Ok(resolve_endpoint(&base, message.data.trim())));
                        }
                    }
                    Ok(Event::Message(message)) => pending_l.route(&message.data).await,
                    Err(e) => {
                        warn!("SSE stream error on {}: {}", base, e);
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Err(e.to_string()));
                        }
                        break;
                    }
                }
            }
            source.close();
            connected_l.store(false, Ordering::SeqCst);
            pending_l.fail_all().await;
            debug!("SSE listener finished: {}", base);
        });

        let message_url = match tokio::time::timeout(ENDPOINT_WAIT.min(timeout), ready_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(reason))) => {
                listener.abort();
                return Err(Error::Mcp(format!("SSE connection failed: {}", reason)));
            }
            // endpoint 이벤트 없음
            _ => default_message_url(url),
        };
        debug!("MCP SSE message endpoint: {}", message_url);

        Ok(Self {
            client,
            message_url,
            pending,
            connected,
            listener: Mutex::new(Some(listener)),
            timeout,
        })
    }

    pub fn message_url(&self) -> &str {
        &self.message_url
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<()> {
        let response = self
            .client
            .post(&self.message_url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "{} returned {}",
                self.message_url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::Mcp("SSE transport not connected".to_string()));
        }

        let (id, rx) = self.pending.register().await;
        if let Err(e) = self.post(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.forget(id).await;
            return Err(e);
        }
        self.pending.wait(id, method, rx, self.timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Mcp("SSE transport not connected".to_string()));
        }
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
        self.pending.fail_all().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn default_message_url(url: &str) -> String {
    format!(
        "{}/messages",
        url.trim_end_matches('/').trim_end_matches("/sse")
    )
}

/// `endpoint` 이벤트 값은 절대 URL 또는 서버 기준 경로
fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    match reqwest::Url::parse(base).and_then(|b| b.join(endpoint)) {
        Ok(url) => url.to_string(),
        Err(_) => endpoint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_url() {
        assert_eq!(
            default_message_url("http://localhost:8080/sse"),
            "http://localhost:8080/messages"
        );
        assert_eq!(
            default_message_url("http://localhost:8080/"),
            "http://localhost:8080/messages"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:8080/sse", "/messages?session=7"),
            "http://localhost:8080/messages?session=7"
        );
    }

    #[tokio::test]
    async fn test_pending_routes_by_id() {
        let pending = Pending::default();
        let (first, rx1) = pending.register().await;
        let (second, rx2) = pending.register().await;
        assert_ne!(first, second);

        pending
            .route(&json!({"jsonrpc": "2.0", "id": second, "result": {"ok": 2}}).to_string())
            .await;
        pending
            .route(&json!({"jsonrpc": "2.0", "id": first, "error": {"code": -32601, "message": "nope"}}).to_string())
            .await;

        let timeout = Duration::from_secs(1);
        let ok = pending.wait(second, "b", rx2, timeout).await.unwrap();
        assert_eq!(ok, json!({"ok": 2}));
        let err = pending.wait(first, "a", rx1, timeout).await.unwrap_err();
        assert!(matches!(err, Error::Mcp(msg) if msg.contains("-32601")));
    }

    #[tokio::test]
    async fn test_pending_timeout() {
        let pending = Pending::default();
        let (id, rx) = pending.register().await;
        let err = pending
            .wait(id, "tools/list", rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    /// initialize / tools/list / tools/call 에 답하는 sh 스크립트 서버
    #[cfg(unix)]
    const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"echo","version":"1"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"say","description":"Echo text","inputSchema":{"type":"object","properties":{"text":{"type":"string"}}}}]}}\n' "$id" ;;
    *'"arguments":{"text":"hi"}'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hi"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"unexpected"}}\n' "$id" ;;
  esac
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_round_trip_through_child_process() {
        use super::super::client::McpClient;
        use skein_foundation::TransportConfig;

        let config = TransportConfig::Stdio {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), ECHO_SERVER.to_string()],
            env: HashMap::new(),
        };
        let client = McpClient::connect("echo", &config, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(client.is_connected());

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "say");
        assert_eq!(tools[0].input_schema["properties"]["text"]["type"], json!("string"));

        let result = client.call_tool("say", json!({"text": "hi"})).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "hi");

        let err = client.call_tool("say", json!({"text": "other"})).await.unwrap_err();
        assert!(matches!(err, Error::Mcp(msg) if msg.contains("-32602")));

        client.close().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_spawn_missing_command() {
        let result = StdioTransport::spawn(
            "skein-definitely-missing-binary",
            &[],
            &HashMap::new(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(Error::Mcp(_))));
    }
}
