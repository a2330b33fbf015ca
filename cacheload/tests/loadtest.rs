use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cacheload::http::{HttpRemote, Outcome};
use cacheload::user::SimulatedUser;
use cacheload::workload::{Request, Task, Workload};
use cacheload::{Schedule, loadtest};
use cacheload_test::server::{RecordedRequest, TestServer};

fn workload(key_pool_size: usize) -> Arc<Workload> {
    let workload = Workload::builder()
        .seed(1)
        .key_pool_size(key_pool_size)
        .pacing(Duration::ZERO)
        .build()
        .unwrap();
    Arc::new(workload)
}

fn paced_workload(key_pool_size: usize, pacing: Duration) -> Arc<Workload> {
    let workload = Workload::builder()
        .seed(1)
        .key_pool_size(key_pool_size)
        .pacing(pacing)
        .build()
        .unwrap();
    Arc::new(workload)
}

fn user(server: &TestServer, workload: &Arc<Workload>) -> SimulatedUser {
    let remote = Arc::new(HttpRemote::new(server.base_url()));
    SimulatedUser::new(0, Arc::clone(workload), remote)
}

#[tokio::test]
async fn warmup_populates_first_keys() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let workload = workload(5);
    let mut user = user(&server, &workload);

    user.on_start().await;

    let requests = server.requests();
    assert_eq!(requests.len(), 5);
    for (index, request) in requests.iter().enumerate() {
        let RecordedRequest::Put { key, value } = request else {
            panic!("expected a write, got {request:?}");
        };
        assert_eq!(key, &format!("key_{index:05}"));
        assert!(workload.values().contains(value));
    }
    assert_eq!(user.metrics().put.successes(), 5);
    assert_eq!(user.metrics().get.requests(), 0);

    let remote = HttpRemote::new(server.base_url());
    let outcome = remote.send(Request::Get { key: "key_00002" }).await;
    assert_eq!(outcome, Outcome::Success);
    assert!(server.value("key_00002").is_some());
}

#[tokio::test]
async fn warmup_is_capped() {
    let server = TestServer::new().await;
    let workload = workload(5000);
    let mut user = user(&server, &workload);

    user.on_start().await;

    let requests = server.requests();
    assert_eq!(requests.len(), 100);
    assert_eq!(
        requests.last(),
        Some(&RecordedRequest::Put {
            key: "key_00099".into(),
            value: server.value("key_00099").unwrap(),
        })
    );
}

#[tokio::test]
async fn steady_state_stays_in_pools() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let workload = workload(50);
    let mut user = user(&server, &workload);

    user.on_start().await;
    for _ in 0..300 {
        user.step().await;
    }

    let requests = server.requests();
    assert_eq!(requests.len(), 50 + 300);

    let mut gets = 0;
    for request in &requests[50..] {
        match request {
            RecordedRequest::Get { key } => {
                assert!(workload.keys().contains(key));
                gets += 1;
            }
            RecordedRequest::Put { key, value } => {
                assert!(workload.keys().contains(key));
                assert!(workload.values().contains(value));
            }
        }
    }

    let metrics = user.metrics();
    assert_eq!(metrics.get.successes(), gets);
    assert_eq!(metrics.put.successes(), 50 + 300 - gets);
    assert_eq!(metrics.failures(), 0);
    // 300 draws at 7:3 land well within these bounds
    assert!((150..=270).contains(&gets), "{gets} reads");
}

#[tokio::test]
async fn failures_carry_status_code() {
    let server = TestServer::new().await;
    let workload = workload(10);
    let mut user = user(&server, &workload);

    server.fail_with(503);
    user.on_start().await;
    for _ in 0..20 {
        user.step().await;
    }

    let metrics = user.metrics();
    assert_eq!(metrics.requests(), 30);
    assert_eq!(metrics.failures(), 30);
    assert_eq!(metrics.put.failure_messages["Status code: 503"], metrics.put.failures);
    if metrics.get.failures > 0 {
        assert_eq!(metrics.get.failure_messages["Status code: 503"], metrics.get.failures);
    }

    server.recover();
    user.step().await;
    assert_eq!(user.metrics().failures(), 30);
    assert_eq!(user.metrics().requests(), 31);
}

#[tokio::test]
async fn oversized_values_are_rejected() {
    let server = TestServer::new().await;
    let workload = Workload::builder()
        .seed(3)
        .key_pool_size(3)
        .value_length(300)
        .build()
        .unwrap();
    let mut user = user(&server, &Arc::new(workload));

    user.on_start().await;

    let metrics = user.metrics();
    assert_eq!(metrics.put.failures, 3);
    assert_eq!(metrics.put.failure_messages["Status code: 400"], 3);
}

#[tokio::test]
async fn unreachable_remote_is_a_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let remote = HttpRemote::new(format!("http://127.0.0.1:{port}"));

    let outcome = remote.send(Request::Get { key: "key_00000" }).await;
    let Outcome::Failure(message) = outcome else {
        panic!("expected a failure");
    };
    assert!(message.starts_with("Request error"), "{message}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_against_test_server() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let workload = workload(20);

    let schedule = Schedule::new(4, Duration::from_secs(1));
    let remote = HttpRemote::new(server.base_url());
    let metrics = loadtest::run(remote, Arc::clone(&workload), schedule)
        .await
        .unwrap();

    assert_eq!(metrics.failures(), 0);
    // every user finished its warm-up
    assert!(metrics.task(Task::Put).requests() >= 4 * 20);
    assert!(metrics.task(Task::Get).requests() > 0);
    // requests abandoned at the deadline reach the server without being counted
    assert!(server.requests().len() as u64 >= metrics.requests());
}

#[tokio::test]
async fn run_requires_users() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(server.base_url());

    let result = loadtest::run(remote, workload(5), Schedule::new(0, Duration::from_secs(1))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn step_waits_for_pacing() {
    let server = TestServer::new().await;
    let pacing = Duration::from_millis(100);
    let workload = paced_workload(10, pacing);
    let mut user = user(&server, &workload);

    let start = Instant::now();
    for _ in 0..3 {
        user.step().await;
    }
    let elapsed = start.elapsed();

    assert_eq!(server.requests().len(), 3);
    assert!(elapsed >= 3 * pacing, "three steps took {elapsed:?}");
}

#[tokio::test]
async fn warmup_is_not_paced() {
    let server = TestServer::new().await;
    // a paced warm-up of 5 writes would take at least 10 seconds
    let workload = paced_workload(5, Duration::from_secs(2));
    let mut user = user(&server, &workload);

    let start = Instant::now();
    user.on_start().await;
    let elapsed = start.elapsed();

    assert_eq!(server.requests().len(), 5);
    assert!(elapsed < Duration::from_secs(2), "warm-up took {elapsed:?}");
}

#[tokio::test]
async fn tiny_spawn_rate_skips_late_users() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(server.base_url());
    // the second user's start offset does not fit into a `Duration`
    let schedule = Schedule::new(2, Duration::from_secs(1)).spawn_rate(1e-300);
    // one user sends its warm-up and at most one paced request before the deadline
    let workload = paced_workload(20, Duration::from_secs(5));

    let metrics = loadtest::run(remote, workload, schedule).await.unwrap();

    assert_eq!(metrics.failures(), 0);
    assert!(metrics.put.requests() >= 20);
    assert!(server.requests().len() <= 21, "{} requests", server.requests().len());
}

#[tokio::test]
async fn run_rejects_unbounded_duration() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(server.base_url());

    let result = loadtest::run(remote, workload(5), Schedule::new(1, Duration::MAX)).await;
    assert!(result.is_err());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn run_rejects_zero_duration() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(server.base_url());

    let result = loadtest::run(remote, workload(5), Schedule::new(1, Duration::ZERO)).await;
    assert!(result.is_err());
}
