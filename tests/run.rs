//! End-to-end runs against an in-process HTTP server.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::any,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::watch,
};
use volley::{
    CountExecutor, Executor, Scenario,
    aggregate::Records,
    metric::ErrorKind,
    report::Summary,
    template::RequestTemplate,
};

#[derive(Default)]
struct Target {
    hits: AtomicUsize,
    bodies: Mutex<Vec<Bytes>>,
}

impl Target {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn hit(State(target): State<Arc<Target>>, body: Bytes) -> &'static str {
    target.hits.fetch_add(1, Ordering::SeqCst);
    target.bodies.lock().unwrap().push(body);
    "ok"
}

async fn missing(State(target): State<Arc<Target>>) -> StatusCode {
    target.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

/// Serves `/` with 200 and everything else with 404 on an ephemeral port.
async fn start_target() -> (SocketAddr, Arc<Target>) {
    let target = Arc::new(Target::default());
    let app = Router::new()
        .route("/", any(hit))
        .fallback(missing)
        .with_state(Arc::clone(&target));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, target)
}

fn scenario(url: String, body: Option<&'static str>) -> Scenario<reqwest::Client> {
    let mut template = RequestTemplate::builder(url).method("POST");
    if let Some(body) = body {
        template = template.body(body);
    }
    scenario_with(template.timeout(Duration::from_secs(5)).build().unwrap())
}

fn scenario_with(template: RequestTemplate) -> Scenario<reqwest::Client> {
    Scenario::builder()
        .name("e2e")
        .template(template)
        .transport(reqwest::Client::new())
        .build()
}

/// Accepts connections and holds them open without ever answering.
async fn start_silent_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Answers every request with a 200 that promises 100 body bytes, sends 3
/// and hangs up.
async fn start_truncating_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(truncated_response(stream));
        }
    });
    addr
}

async fn truncated_response(mut stream: TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let _ = stream
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc")
        .await;
    let _ = stream.shutdown().await;
}

#[tokio::test]
async fn runs_exactly_n_requests() {
    let (addr, target) = start_target().await;
    let records: Records = CountExecutor::builder()
        .requests(20)
        .concurrency(2)
        .build()
        .exec(&scenario(format!("http://{addr}/"), None))
        .await
        .unwrap();

    assert_eq!(target.hits(), 20);
    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|o| o.success && o.status == Some(200) && o.bytes == 2));
}

#[tokio::test]
async fn every_request_carries_the_body() {
    let (addr, target) = start_target().await;
    let _: Records = CountExecutor::builder()
        .requests(20)
        .concurrency(4)
        .build()
        .exec(&scenario(format!("http://{addr}/"), Some("Body")))
        .await
        .unwrap();

    let bodies = target.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 20);
    assert!(bodies.iter().all(|b| b.as_ref() == b"Body"));
}

#[tokio::test]
async fn qps_caps_the_whole_pool() {
    let (addr, target) = start_target().await;
    let (stop_tx, stop_rx) = watch::channel(false);
    let executor = CountExecutor::builder()
        .requests(100)
        .concurrency(8)
        .qps(2.0)
        .stop(stop_rx)
        .build();
    let scenario = scenario(format!("http://{addr}/"), None);
    let handle = tokio::spawn(async move {
        let records: volley::Result<Records> = executor.exec(&scenario).await;
        records
    });

    tokio::time::sleep(Duration::from_millis(1200)).await;
    stop_tx.send_replace(true);
    let records = handle.await.unwrap().unwrap();

    // tickets at 0 s, 0.5 s and 1 s; eight workers do not multiply that
    assert!(target.hits() <= 4, "{} hits", target.hits());
    assert!(!records.is_empty());
    assert_eq!(records.len(), target.hits());
}

#[tokio::test]
async fn error_statuses_are_successful_attempts() {
    let (addr, target) = start_target().await;
    let records: Records = CountExecutor::builder()
        .requests(5)
        .concurrency(2)
        .build()
        .exec(&scenario(format!("http://{addr}/missing"), None))
        .await
        .unwrap();

    assert_eq!(target.hits(), 5);
    assert!(records.iter().all(|o| o.success && o.status == Some(404)));

    let summary = Summary::from(records);
    assert_eq!(summary.successes, 5);
    assert_eq!(summary.status_codes.get(&404), Some(&5));
}

#[tokio::test]
async fn refused_connections_are_recorded_not_raised() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let records: Records = CountExecutor::builder()
        .requests(6)
        .concurrency(3)
        .build()
        .exec(&scenario(format!("http://{addr}/"), None))
        .await
        .unwrap();

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|o| !o.success && o.status.is_none()));
    assert!(records.iter().all(|o| o.error == Some(ErrorKind::Connect)));

    let summary = Summary::from(records);
    assert_eq!(summary.failures, 6);
    assert_eq!(summary.errors.get(&ErrorKind::Connect), Some(&6));
}

#[tokio::test]
async fn zero_requests_send_nothing() {
    let (addr, target) = start_target().await;
    let records: Records = CountExecutor::builder()
        .requests(0)
        .concurrency(4)
        .build()
        .exec(&scenario(format!("http://{addr}/"), None))
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(target.hits(), 0);
}

#[tokio::test]
async fn more_workers_than_requests() {
    let (addr, target) = start_target().await;
    let records: Records = CountExecutor::builder()
        .requests(3)
        .concurrency(32)
        .qps(50.0)
        .build()
        .exec(&scenario(format!("http://{addr}/"), None))
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(target.hits(), 3);
}

#[tokio::test]
async fn unanswered_requests_time_out() {
    let addr = start_silent_target().await;
    let template = RequestTemplate::builder(format!("http://{addr}/"))
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let records: Records = CountExecutor::builder()
        .requests(2)
        .concurrency(2)
        .build()
        .exec(&scenario_with(template))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    for o in records.iter() {
        assert!(!o.success);
        assert_eq!(o.status, None);
        assert_eq!(o.error, Some(ErrorKind::Timeout));
        assert!(o.duration >= Duration::from_millis(200));
    }
}

#[tokio::test]
async fn truncated_body_keeps_the_status() {
    let addr = start_truncating_target().await;
    let template = RequestTemplate::builder(format!("http://{addr}/"))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let records: Records = CountExecutor::builder()
        .requests(2)
        .concurrency(2)
        .build()
        .exec(&scenario_with(template))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    for o in records.iter() {
        assert!(!o.success);
        assert_eq!(o.status, Some(200));
        assert_eq!(o.error, Some(ErrorKind::Body));
        assert_eq!(o.bytes, 3);
    }

    let summary = Summary::from(records);
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.status_codes.get(&200), Some(&2));
}
