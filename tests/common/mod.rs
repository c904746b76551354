use std::io::Read;
use std::sync::Arc;

use arn_client::metrics::Metrics;
use arn_client::transport::HttpTransport;
use arn_client::transport::SharedSas;
use arn_client::transport::StaticToken;
use arn_client::BackoffPolicy;
use arn_client::BlobConfig;
use arn_client::Client;
use arn_client::ClientBuilder;
use arn_client::HttpConfig;
use arn_client::Settings;
use flate2::read::ZlibDecoder;
use serde_json::Value;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::path_regex;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Request;
use wiremock::ResponseTemplate;

pub const TOKEN: &str = "integration-token";
pub const SAS: &str = "sv=2023-11-03&sp=r&sig=it";
pub const CONTAINER_EXT: &str = "it";
pub const BLOB_PATH: &str = r"^/arm-ext-nt-it-\d{4}-\d{2}-\d{2}-\d{1,2}/[0-9a-f-]{36}\.txt$";

/// Receiver and blob storage served by one mock server.
pub struct Harness {
    pub server: MockServer,
    pub client: Client,
    pub metrics: Arc<Metrics>,
}

pub fn settings(
    server: &MockServer,
    compression: bool,
) -> Settings {
    Settings {
        http: HttpConfig {
            endpoint: server.uri(),
            compression,
            request_timeout_ms: 5_000,
            ..Default::default()
        },
        blob: BlobConfig {
            endpoint: Some(server.uri()),
            container_ext: CONTAINER_EXT.to_string(),
            ..Default::default()
        },
        retry: BackoffPolicy {
            max_retries: 3,
            timeout_ms: 2_000,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..Default::default()
    }
}

pub async fn start(compression: bool) -> Harness {
    let server = MockServer::start().await;
    let client_settings = settings(&server, compression);
    start_with(server, client_settings)
}

pub fn start_with(
    server: MockServer,
    settings: Settings,
) -> Harness {
    let transport = HttpTransport::from_settings(
        &settings,
        Arc::new(StaticToken::new(TOKEN)),
        Some(Arc::new(SharedSas::new(SAS))),
    )
    .unwrap();
    let metrics = Arc::new(Metrics::default());
    let client = ClientBuilder::new(settings)
        .transport(Arc::new(transport))
        .metrics(metrics.clone())
        .build()
        .unwrap();
    Harness {
        server,
        client,
        metrics,
    }
}

pub async fn accept_events(
    server: &MockServer,
    status: u16,
) {
    Mock::given(method("POST"))
        .and(path("/arnnotify"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn accept_blobs(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path_regex(BLOB_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

/// Envelopes posted to the receiver, inflated when needed, in arrival order.
pub async fn envelopes(server: &MockServer) -> Vec<Value> {
    requests(server, "POST")
        .await
        .iter()
        .map(|r| serde_json::from_slice(&body(r)).unwrap())
        .collect()
}

pub async fn requests(
    server: &MockServer,
    verb: &str,
) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb)
        .collect()
}

fn body(request: &Request) -> Vec<u8> {
    let deflated = request
        .headers
        .get("content-encoding")
        .is_some_and(|v| v.as_bytes() == b"deflate");
    if !deflated {
        return request.body.clone();
    }
    let mut out = Vec::new();
    ZlibDecoder::new(request.body.as_slice()).read_to_end(&mut out).unwrap();
    out
}
