//! End-to-end loading over HTTP against a mock server.

use std::sync::Arc;

use virtuous_loader::{
    LoaderConfig, LoaderError, ModuleLoader, ModuleRegistry, TransportError, Value, VerifyPolicy,
    digest, sidecar::render_sidecar,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_SOURCE: &str = concat!(
    "# generated by virtuous\n",
    "BASE_URL = \"http://localhost:8000\"\n",
    "ROUTES = {\n",
    "    \"States\": [\"getByCode\", \"list\"],\n",
    "}\n",
);

async fn serve(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Runs `f` with a fresh loader on a blocking thread.
async fn with_loader<T, F>(config: LoaderConfig, f: F) -> (T, Arc<ModuleRegistry>)
where
    T: Send + 'static,
    F: FnOnce(&ModuleLoader) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let registry = Arc::new(ModuleRegistry::new());
        let loader = ModuleLoader::builder(Arc::clone(&registry))
            .config(config)
            .build()
            .expect("valid config");
        (f(&loader), registry)
    })
    .await
    .expect("loader task panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn loads_simple_module_over_http() {
    let server = MockServer::start().await;
    serve(&server, "/m.py", "x = 1\n").await;
    let url = format!("{}/m.py", server.uri());

    let (result, registry) =
        with_loader(LoaderConfig::default(), move |loader| loader.load(&url, None)).await;
    let module = result.unwrap();

    assert_eq!(module.get("x"), Some(Value::Int(1)));
    assert_eq!(module.digest(), &digest(b"x = 1\n"));
    assert!(module.name().starts_with("virtuous_client_"));
    assert_eq!(module.name().len(), "virtuous_client_".len() + 8);
    assert!(registry.contains(module.name()));
}

#[tokio::test(flavor = "multi_thread")]
async fn verifies_against_published_sidecar() {
    let server = MockServer::start().await;
    serve(&server, "/client.gen.py", CLIENT_SOURCE).await;
    let published = render_sidecar(
        digest(CLIENT_SOURCE.as_bytes()).as_str(),
        "client.gen.py",
    );
    serve(&server, "/client.gen.py.sha256", published).await;
    let url = format!("{}/client.gen.py", server.uri());

    let config = LoaderConfig {
        verify: VerifyPolicy::Sidecar,
        ..LoaderConfig::default()
    };
    let (result, _) = with_loader(config, move |loader| loader.load(&url, Some("client"))).await;
    let module = result.unwrap();

    assert_eq!(module.name(), "client");
    assert_eq!(
        module.get("BASE_URL"),
        Some(Value::from("http://localhost:8000"))
    );
    assert!(module.contains("ROUTES"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_module_that_does_not_match_sidecar() {
    let server = MockServer::start().await;
    serve(&server, "/client.gen.py", CLIENT_SOURCE).await;
    serve(
        &server,
        "/client.gen.py.sha256",
        render_sidecar(digest(b"tampered").as_str(), "client.gen.py"),
    )
    .await;
    let url = format!("{}/client.gen.py", server.uri());

    let config = LoaderConfig {
        verify: VerifyPolicy::Sidecar,
        ..LoaderConfig::default()
    };
    let (result, registry) =
        with_loader(config, move |loader| loader.load(&url, Some("client"))).await;

    assert!(matches!(result, Err(LoaderError::Integrity(_))));
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn resolves_expected_hash_from_sidecar() {
    let server = MockServer::start().await;
    serve(&server, "/m.py.sha256", "abc123  filename.py\n").await;
    let url = format!("{}/m.py", server.uri());

    let (result, _) = with_loader(LoaderConfig::default(), move |loader| {
        loader.resolve_expected_hash(&url)
    })
    .await;

    assert_eq!(result.unwrap(), "abc123");
}

#[tokio::test(flavor = "multi_thread")]
async fn persists_and_executes_from_disk() {
    let server = MockServer::start().await;
    serve(&server, "/client.gen.py", CLIENT_SOURCE).await;
    let url = format!("{}/client.gen.py", server.uri());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clients/v1/client.gen.py");
    let target_for_load = target.clone();

    let (result, _) = with_loader(LoaderConfig::default(), move |loader| {
        loader.load_to_disk(&url, &target_for_load, None)
    })
    .await;
    let module = result.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), CLIENT_SOURCE.as_bytes());
    assert_eq!(module.path(), Some(target.as_path()));
    assert_eq!(
        module.get("BASE_URL"),
        Some(Value::from("http://localhost:8000"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn http_failure_is_reported_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/m.py"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let url = format!("{}/m.py", server.uri());

    let (result, registry) =
        with_loader(LoaderConfig::default(), move |loader| loader.load(&url, None)).await;

    match result {
        Err(e @ LoaderError::Transport(TransportError::HttpStatus { .. })) => {
            assert!(e.is_retryable());
        }
        other => panic!("Expected HttpStatus transport error, got {other:?}"),
    }
    assert!(registry.is_empty());
}
