mod common;

use std::sync::{Arc, Mutex};

use common::{Call, MockSdk, client, settle, take};
use confbridge_core::session::SdkState;
use confbridge_core::{
    ConfError, ConferenceEvent, Operation, Settings, TokenFetcher, TokenRequest,
};
use futures_util::future::BoxFuture;

#[derive(Default)]
struct FakeFetcher {
    requests: Mutex<Vec<TokenRequest>>,
    rejected_keys: Vec<String>,
}

impl FakeFetcher {
    fn rejecting(key: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            rejected_keys: vec![key.to_string()],
        }
    }

    fn keys(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.app_key.clone())
            .collect()
    }
}

impl TokenFetcher for FakeFetcher {
    fn fetch(&self, request: TokenRequest) -> BoxFuture<'static, Result<String, ConfError>> {
        self.requests.lock().unwrap().push(request.clone());
        let rejected = self.rejected_keys.contains(&request.app_key);
        Box::pin(async move {
            if rejected {
                Err(ConfError::Auth("endpoint returned status 401".into()))
            } else {
                Ok(format!("token-{}", request.app_key))
            }
        })
    }
}

#[tokio::test]
async fn fetched_token_initializes_the_sdk() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::default());
    let (client, events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());

    client
        .set_token_using_key_and_secret("key", "secret", Some(600))
        .unwrap();
    settle(&mut client).await;

    assert_eq!(fetcher.requests.lock().unwrap()[0].ttl_seconds, 600);
    assert_eq!(sdk.calls(), vec![Call::Initialize("token-key".into())]);
    assert_eq!(
        take(&events),
        vec![ConferenceEvent::TokenNeeded, ConferenceEvent::Initialized]
    );
}

#[tokio::test]
async fn ttl_defaults_to_configured_lifetime() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::default());
    let settings = Settings {
        token_ttl_seconds: 120,
        ..Settings::default()
    };
    let (client, _events) = common::client_with_settings(&sdk, settings);
    let mut client = client.with_token_fetcher(fetcher.clone());

    client.set_token_using_key_and_secret("key", "secret", None).unwrap();
    assert_eq!(fetcher.requests.lock().unwrap()[0].ttl_seconds, 120);
}

#[tokio::test]
async fn identical_requests_are_coalesced() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::default());
    let (client, _events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());

    client.set_token_using_key_and_secret("key", "secret", Some(60)).unwrap();
    client.set_token_using_key_and_secret("key", "secret", Some(60)).unwrap();
    settle(&mut client).await;

    assert_eq!(fetcher.keys(), vec!["key".to_string()]);
    assert_eq!(sdk.count("initialize"), 1);
}

#[tokio::test]
async fn newer_request_supersedes_the_older_one() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::default());
    let (client, _events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());

    client.set_token_using_key_and_secret("old", "secret", Some(60)).unwrap();
    client.set_token_using_key_and_secret("new", "secret", Some(60)).unwrap();
    settle(&mut client).await;

    assert_eq!(fetcher.keys(), vec!["old".to_string(), "new".to_string()]);
    assert_eq!(sdk.calls(), vec![Call::Initialize("token-new".into())]);
}

#[tokio::test]
async fn failed_fetch_is_reported_and_not_retried() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::rejecting("key"));
    let (client, events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());
    settle(&mut client).await;
    take(&events);

    client.set_token_using_key_and_secret("key", "secret", Some(60)).unwrap();
    settle(&mut client).await;

    let seen = take(&events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(
        &seen[0],
        ConferenceEvent::OperationFailed { operation: Operation::FetchToken(_), .. }
    ));
    assert_eq!(client.errors_handled(), 1);
    assert_eq!(client.sdk_state(), SdkState::Uninitialized);
    assert_eq!(fetcher.keys().len(), 1);
    assert!(sdk.calls().is_empty());
}

#[tokio::test]
async fn failure_of_a_superseded_fetch_is_dropped() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::rejecting("old"));
    let (client, _events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());

    client.set_token_using_key_and_secret("old", "secret", Some(60)).unwrap();
    client.set_token_using_key_and_secret("new", "secret", Some(60)).unwrap();
    settle(&mut client).await;

    assert_eq!(client.errors_handled(), 0);
    assert_eq!(client.sdk_state(), SdkState::Initialized);
}

#[tokio::test]
async fn invalid_credentials_are_rejected_up_front() {
    let sdk = MockSdk::new();
    let fetcher = Arc::new(FakeFetcher::default());
    let (client, _events) = client(&sdk);
    let mut client = client.with_token_fetcher(fetcher.clone());

    assert!(matches!(
        client.set_token_using_key_and_secret("", "secret", Some(60)),
        Err(ConfError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.set_token_using_key_and_secret("key", "secret", Some(0)),
        Err(ConfError::InvalidArgument(_))
    ));
    assert!(fetcher.keys().is_empty());
}

#[tokio::test]
async fn no_endpoint_means_no_fetch() {
    let sdk = MockSdk::new();
    let (mut client, _events) = client(&sdk);
    assert!(matches!(
        client.set_token_using_key_and_secret("key", "secret", Some(60)),
        Err(ConfError::Auth(_))
    ));
}
