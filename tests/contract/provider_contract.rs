//! Contract tests every provider must satisfy.
//!
//! Built-in providers are discovered through the registry, so a newly
//! registered backend is covered without touching this file.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lexis_core::providers::{RemoteEndpoint, RemoteProvider};
use lexis_core::{
    AnalysisPayload, BreakerPolicy, HttpClient, HttpError, HttpRequest, HttpResponse, Operation,
    Params, Provider, ProviderErrorKind, ProviderRegistry, SentimentResult, SharedClock,
};

const ARTICLE: &str = "Rust adoption keeps growing across the industry. \
    Teams report fewer crashes after migrating critical services. \
    The compiler is strict, but developers say the strictness pays off. \
    Hiring remains the main obstacle for smaller companies.";

const UNICODE: &str = "Café owners in Zürich are très happy. 東京の市場は好調です! \
    Ünïcödé text must not break anything.";

fn builtin_registry() -> ProviderRegistry {
    ProviderRegistry::with_builtin(BreakerPolicy::default(), SharedClock::system())
}

fn all_builtin() -> Vec<Arc<dyn Provider>> {
    let registry = builtin_registry();
    [Operation::Sentiment, Operation::Summary, Operation::Keywords]
        .into_iter()
        .flat_map(|operation| {
            registry
                .backends_for(operation)
                .into_iter()
                .filter_map(|backend| registry.get(operation, &backend))
                .map(|entry| entry.provider)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn builtin_backends_are_registered_per_operation() {
    let registry = builtin_registry();

    assert_eq!(registry.backends_for(Operation::Sentiment), ["lexicon"]);
    assert_eq!(registry.backends_for(Operation::Summary), ["frequency", "lead"]);
    assert_eq!(registry.backends_for(Operation::Keywords), ["frequency"]);
    assert_eq!(registry.len(), 4);
}

#[tokio::test]
async fn every_builtin_returns_a_payload_for_its_own_operation() {
    for provider in all_builtin() {
        assert!(!provider.backend().is_empty());

        let payload = provider
            .call(ARTICLE, &Params::new())
            .await
            .unwrap_or_else(|error| panic!("{} failed: {error}", provider.backend()));

        assert_eq!(
            payload.operation(),
            provider.operation(),
            "{} answered for the wrong operation",
            provider.backend()
        );
    }
}

#[tokio::test]
async fn every_builtin_is_deterministic() {
    for provider in all_builtin() {
        let first = provider.call(ARTICLE, &Params::new()).await.expect("first");
        let second = provider.call(ARTICLE, &Params::new()).await.expect("second");

        assert_eq!(first, second, "{} is not deterministic", provider.backend());
    }
}

#[tokio::test]
async fn every_builtin_handles_unicode_text() {
    for provider in all_builtin() {
        let payload = provider.call(UNICODE, &Params::new()).await.expect("unicode");

        if let AnalysisPayload::Summary(summary) = &payload {
            assert!(summary.summary_len <= summary.original_len);
            assert!(UNICODE.contains(summary.summary.split_whitespace().next().unwrap_or("")));
        }
    }
}

#[tokio::test]
async fn sentiment_scores_stay_in_range() {
    let registry = builtin_registry();
    let entry = registry.get(Operation::Sentiment, "lexicon").expect("lexicon");

    for text in [ARTICLE, UNICODE, "not bad at all", "very very good", "terrible awful"] {
        let AnalysisPayload::Sentiment(result) =
            entry.provider.call(text, &Params::new()).await.expect("scored")
        else {
            panic!("expected sentiment");
        };
        assert!((-1.0..=1.0).contains(&result.polarity), "{text}");
        assert!((0.0..=1.0).contains(&result.subjectivity), "{text}");
    }
}

#[tokio::test]
async fn summarizers_reject_text_without_sentences() {
    let registry = builtin_registry();

    for backend in registry.backends_for(Operation::Summary) {
        let entry = registry.get(Operation::Summary, &backend).expect("registered");
        let error = entry
            .provider
            .call("   ", &Params::new())
            .await
            .expect_err("nothing to summarize");

        assert_eq!(error.kind(), ProviderErrorKind::InvalidInput, "{backend}");
        assert!(!error.is_transient());
    }
}

// =============================================================================
// Remote providers honor the same contract through a canned transport
// =============================================================================

struct Canned {
    status: u16,
    body: String,
    seen: Mutex<Vec<HttpRequest>>,
}

impl HttpClient for Canned {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);
        let response = HttpResponse {
            status: self.status,
            body: self.body.clone(),
        };
        Box::pin(async move { Ok(response) })
    }
}

fn remote(status: u16, body: String) -> (RemoteProvider, Arc<Canned>) {
    let transport = Arc::new(Canned {
        status,
        body,
        seen: Mutex::new(Vec::new()),
    });
    let provider = RemoteProvider::new(
        RemoteEndpoint {
            name: String::from("acme"),
            operation: Operation::Sentiment,
            url: String::from("https://nlp.example.com/v1/sentiment"),
            api_key: Some(String::from("secret")),
            api_key_header: None,
        },
        Duration::from_secs(5),
    )
    .with_client(transport.clone());
    (provider, transport)
}

#[tokio::test]
async fn remote_provider_decodes_a_matching_payload() {
    let expected = AnalysisPayload::Sentiment(SentimentResult::from_scores(0.4, 0.6));
    let (provider, transport) = remote(200, serde_json::to_string(&expected).expect("encode"));

    let payload = provider
        .call("great news today", &Params::new())
        .await
        .expect("decoded");

    assert_eq!(provider.backend(), "remote:acme");
    assert_eq!(payload, expected);
    let seen = transport.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert!(seen[0].body.contains("great news today"));
    assert_eq!(
        seen[0].headers.get("authorization").map(String::as_str),
        Some("Bearer secret")
    );
}

#[tokio::test]
async fn remote_provider_classifies_server_errors_as_transient() {
    let (provider, _) = remote(503, String::from("maintenance"));

    let error = provider
        .call("anything", &Params::new())
        .await
        .expect_err("server error");

    assert_eq!(error.kind(), ProviderErrorKind::Unavailable);
    assert!(error.is_transient());
}
