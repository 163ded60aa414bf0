use std::time::Duration;

use k8s_openapi::api::networking::v1::{HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressRule, IngressSpec};
use kube::{api::ObjectMeta, ResourceExt};

use super::{IngressSolver, SolverError};
use crate::{
    certificate::Certificate,
    common::is_controlled_by,
    configuration::SolverConfiguration,
    labels::{ChallengeLabeler, DefaultChallengeLabeler},
    path::ACME_SOLVER_LISTEN_PORT,
    store::{InMemoryIngressStore, StoreError},
};

const CERTIFICATE: &str = r"
apiVersion: certmanager.k8s.io/v1alpha1
kind: Certificate
metadata:
  name: cert-a
  namespace: ns1
  uid: 6b1c7e52-0d55-4a1e-9d0e-3f3c1c2f9a10
spec:
  secretName: cert-a-tls
  dnsNames:
  - example.com
  - shared.example.com
  - www.example.com
  acme:
    config:
    - domains:
      - example.com
    - domains:
      - shared.example.com
      - www.example.com
      http01:
        ingress: user-ing
status:
  acme:
    orderUrl: https://acme.example/order/1
";

fn certificate() -> Certificate {
    serde_yaml::from_str(CERTIFICATE).unwrap()
}

fn solver(store: &InMemoryIngressStore) -> IngressSolver<InMemoryIngressStore> {
    IngressSolver::builder().store(store.clone()).build()
}

fn user_path(value: &str) -> HTTPIngressPath {
    HTTPIngressPath { path: Some(value.to_owned()), path_type: "Prefix".to_owned(), ..HTTPIngressPath::default() }
}

fn user_ingress(rules: Vec<IngressRule>) -> Ingress {
    Ingress {
        metadata: ObjectMeta { name: Some("user-ing".to_owned()), namespace: Some("ns1".to_owned()), ..ObjectMeta::default() },
        spec: Some(IngressSpec { rules: Some(rules), ..IngressSpec::default() }),
        ..Ingress::default()
    }
}

fn rules(ingress: &Ingress) -> Vec<IngressRule> {
    ingress.spec.as_ref().and_then(|spec| spec.rules.clone()).unwrap_or_default()
}

fn paths_for(ingress: &Ingress, host: &str) -> Vec<String> {
    rules(ingress)
        .iter()
        .filter(|rule| rule.host.as_deref() == Some(host))
        .flat_map(|rule| rule.http.iter().flat_map(|http| http.paths.iter().filter_map(|p| p.path.clone())).collect::<Vec<_>>())
        .collect()
}

#[tokio::test]
async fn test_dedicated_ingress_lifecycle() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let certificate = certificate();

    let created = solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok123").await.unwrap();
    let ingresses = store.ingresses("ns1");
    assert_eq!(ingresses.len(), 1);
    assert_eq!(ingresses[0], created);

    let rules = rules(&created);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].host.as_deref(), Some("example.com"));
    let paths = &rules[0].http.as_ref().unwrap().paths;
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].path.as_deref(), Some("/.well-known/acme-challenge/tok123"));
    let backend = paths[0].backend.service.as_ref().unwrap();
    assert_eq!(backend.name, "solver-svc");
    assert_eq!(backend.port.as_ref().unwrap().number, Some(ACME_SOLVER_LISTEN_PORT));

    solver.cleanup_ingresses(&certificate, "example.com", "tok123").await.unwrap();
    assert!(store.ingresses("ns1").is_empty());
}

#[tokio::test]
async fn test_ensure_then_find() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let certificate = certificate();

    solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok123").await.unwrap();
    let found = solver.find_ingresses(&certificate, "example.com").await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(*found[0].labels(), DefaultChallengeLabeler.labels_for(&certificate, "example.com"));
    assert!(is_controlled_by(&found[0].metadata, &certificate));
}

#[tokio::test]
async fn test_missing_domain_config() {
    let store = InMemoryIngressStore::new();
    let error = solver(&store).ensure_ingress(&certificate(), "solver-svc", "unknown.example.com", "tok").await.unwrap_err();

    assert!(matches!(&error, SolverError::MissingDomainConfig(domain) if domain == "unknown.example.com"));
    assert_eq!(error.to_string(), "no ACME challenge configuration found for domain \"unknown.example.com\"");
    assert_eq!(store.calls().total(), 0);
}

#[tokio::test]
async fn test_shared_ingress_insert_and_remove() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![IngressRule {
        host: Some("shared.example.com".to_owned()),
        http: Some(HTTPIngressRuleValue { paths: vec![user_path("/foo")] }),
    }]))
    .unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    let updated = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok456").await.unwrap();
    assert_eq!(paths_for(&updated, "shared.example.com"), vec!["/foo", "/.well-known/acme-challenge/tok456"]);

    solver.cleanup_ingresses(&certificate, "shared.example.com", "tok456").await.unwrap();
    let cleaned = store.snapshot("ns1", "user-ing").unwrap();
    assert_eq!(paths_for(&cleaned, "shared.example.com"), vec!["/foo"]);
    assert_eq!(rules(&cleaned)[0].http.as_ref().unwrap().paths[0], user_path("/foo"));
}

#[tokio::test]
async fn test_shared_ingress_is_idempotent() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    let first = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok").await.unwrap();
    let second = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok").await.unwrap();

    assert_eq!(first.spec, second.spec);
    assert_eq!(rules(&second).len(), 1);
    assert_eq!(paths_for(&second, "shared.example.com").len(), 1);
}

#[tokio::test]
async fn test_token_rotation_on_shared_ingress() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![IngressRule {
        host: Some("shared.example.com".to_owned()),
        http: Some(HTTPIngressRuleValue { paths: vec![user_path("/foo")] }),
    }]))
    .unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tokA").await.unwrap();
    let updated = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tokB").await.unwrap();
    assert_eq!(paths_for(&updated, "shared.example.com"), vec!["/foo", "/.well-known/acme-challenge/tokB"]);

    solver.cleanup_ingresses(&certificate, "shared.example.com", "tokA").await.unwrap();
    assert_eq!(store.calls().replace, 2);
    solver.cleanup_ingresses(&certificate, "shared.example.com", "tokB").await.unwrap();
    assert_eq!(paths_for(&store.snapshot("ns1", "user-ing").unwrap(), "shared.example.com"), vec!["/foo"]);
}

#[tokio::test]
async fn test_user_challenge_path_survives_ensure_and_cleanup() {
    let store = InMemoryIngressStore::new();
    let site_verification = user_path("/.well-known/acme-challenge/site-verification");
    store.insert(user_ingress(vec![IngressRule {
        host: Some("shared.example.com".to_owned()),
        http: Some(HTTPIngressRuleValue { paths: vec![user_path("/foo"), site_verification.clone()] }),
    }]))
    .unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    let updated = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok456").await.unwrap();
    assert_eq!(
        paths_for(&updated, "shared.example.com"),
        vec!["/foo", "/.well-known/acme-challenge/site-verification", "/.well-known/acme-challenge/tok456"]
    );

    solver.cleanup_ingresses(&certificate, "shared.example.com", "tok456").await.unwrap();
    let cleaned = store.snapshot("ns1", "user-ing").unwrap();
    assert_eq!(rules(&cleaned)[0].http.as_ref().unwrap().paths, vec![user_path("/foo"), site_verification]);
}

#[tokio::test]
async fn test_unrelated_rules_are_untouched() {
    let store = InMemoryIngressStore::new();
    let unrelated = vec![
        IngressRule {
            host: Some("app.example.com".to_owned()),
            http: Some(HTTPIngressRuleValue { paths: vec![user_path("/"), user_path("/api")] }),
        },
        IngressRule { host: None, http: Some(HTTPIngressRuleValue { paths: vec![user_path("/default")] }) },
    ];
    store.insert(user_ingress(unrelated.clone())).unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    let updated = solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok").await.unwrap();
    assert_eq!(rules(&updated)[..2], unrelated[..]);
    assert_eq!(rules(&updated).len(), 3);

    solver.cleanup_ingresses(&certificate, "shared.example.com", "tok").await.unwrap();
    let cleaned = store.snapshot("ns1", "user-ing").unwrap();
    assert_eq!(rules(&cleaned)[..2], unrelated[..]);
}

#[tokio::test]
async fn test_cleanup_twice_succeeds() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    let solver = solver(&store);
    let certificate = certificate();

    solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok").await.unwrap();
    solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok").await.unwrap();

    for _ in 0..2 {
        solver.cleanup_ingresses(&certificate, "example.com", "tok").await.unwrap();
        solver.cleanup_ingresses(&certificate, "shared.example.com", "tok").await.unwrap();
    }
    assert_eq!(store.ingresses("ns1").len(), 1);
    assert!(paths_for(&store.snapshot("ns1", "user-ing").unwrap(), "shared.example.com").is_empty());
}

#[tokio::test]
async fn test_cleanup_without_removal_does_not_write() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![IngressRule { host: Some("shared.example.com".to_owned()), http: None }])).unwrap();
    let solver = solver(&store);

    solver.cleanup_ingresses(&certificate(), "shared.example.com", "tok").await.unwrap();
    assert_eq!(store.calls().get, 1);
    assert_eq!(store.calls().replace, 0);
}

#[tokio::test]
async fn test_cleanup_of_deleted_shared_ingress() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);

    solver.cleanup_ingresses(&certificate(), "shared.example.com", "tok").await.unwrap();
    assert_eq!(store.calls().get, 1);
}

#[tokio::test]
async fn test_cleanup_propagates_fetch_error() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    store.fail_gets_of("ns1", "user-ing");
    let solver = solver(&store);

    let error = solver.cleanup_ingresses(&certificate(), "shared.example.com", "tok").await.unwrap_err();
    assert!(matches!(error, SolverError::Store(StoreError::Rejected { operation: "get", .. })));
    assert!(!error.is_retryable());
    assert_eq!(store.calls().replace, 0);
}

#[tokio::test]
async fn test_cleanup_propagates_update_error() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    let solver = solver(&store);
    let certificate = certificate();
    solver.ensure_ingress(&certificate, "solver-svc", "shared.example.com", "tok").await.unwrap();
    store.fail_replaces_of("ns1", "user-ing");

    let error = solver.cleanup_ingresses(&certificate, "shared.example.com", "tok").await.unwrap_err();
    assert!(matches!(error, SolverError::Store(StoreError::Rejected { operation: "replace", .. })));
    assert_eq!(
        paths_for(&store.snapshot("ns1", "user-ing").unwrap(), "shared.example.com"),
        vec!["/.well-known/acme-challenge/tok"]
    );
}

#[tokio::test]
async fn test_ensure_requires_existing_shared_ingress() {
    let store = InMemoryIngressStore::new();
    let error = solver(&store).ensure_ingress(&certificate(), "solver-svc", "shared.example.com", "tok").await.unwrap_err();
    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_cleanup_without_domain_config() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let certificate = certificate();

    solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok").await.unwrap();
    let mut torn_down = certificate.clone();
    torn_down.spec.acme = None;

    // Without configuration the domain is cleaned up as a dedicated ingress domain.
    solver.cleanup_ingresses(&torn_down, "example.com", "tok").await.unwrap();
    assert!(store.ingresses("ns1").is_empty());
}

#[tokio::test]
async fn test_bulk_cleanup_continues_after_failure() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let certificate = certificate();

    let first = solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok").await.unwrap();
    let second = solver.ensure_ingress(&certificate, "solver-svc", "example.com", "tok").await.unwrap();
    store.fail_deletes_of("ns1", &first.name_any());

    let error = solver.cleanup_ingresses(&certificate, "example.com", "tok").await.unwrap_err();

    let SolverError::Aggregate(aggregate) = error else {
        panic!("expected an aggregate error, got {error:?}");
    };
    assert_eq!(aggregate.len(), 1);
    assert!(matches!(&aggregate.errors()[0], StoreError::Rejected { resource, .. } if resource.name == first.name_any()));
    assert!(store.snapshot("ns1", &second.name_any()).is_none());
    assert!(store.snapshot("ns1", &first.name_any()).is_some());
    assert_eq!(store.calls().delete, 2);
}

#[tokio::test]
async fn test_foreign_ingress_survives_cleanup() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let certificate = certificate();

    let mut foreign = solver.build_ingress(&certificate, "solver-svc", "example.com", "tok", &Default::default()).unwrap();
    foreign.metadata.name = Some("look-alike".to_owned());
    foreign.metadata.owner_references = None;
    store.insert(foreign).unwrap();

    solver.cleanup_ingresses(&certificate, "example.com", "tok").await.unwrap();
    assert!(store.snapshot("ns1", "look-alike").is_some());
}

#[tokio::test]
async fn test_no_active_order_cleanup_touches_nothing() {
    let store = InMemoryIngressStore::new();
    let solver = solver(&store);
    let mut certificate = certificate();
    certificate.status = None;

    solver.cleanup_ingresses(&certificate, "example.com", "tok").await.unwrap();
    assert_eq!(store.calls().total(), 0);
}

#[tokio::test]
async fn test_concurrent_writer_is_not_overwritten() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    store.write_after_next_get("ns1", "user-ing", |ingress| {
        ingress.spec.get_or_insert_with(IngressSpec::default).rules.get_or_insert_with(Vec::new).push(IngressRule {
            host: Some("www.example.com".to_owned()),
            http: Some(HTTPIngressRuleValue { paths: vec![user_path("/.well-known/acme-challenge/peer")] }),
        });
    });
    let solver = solver(&store);

    let updated = solver.ensure_ingress(&certificate(), "solver-svc", "shared.example.com", "tok").await.unwrap();

    assert_eq!(paths_for(&updated, "www.example.com"), vec!["/.well-known/acme-challenge/peer"]);
    assert_eq!(paths_for(&updated, "shared.example.com"), vec!["/.well-known/acme-challenge/tok"]);
    assert_eq!(store.calls().get, 2);
    assert_eq!(store.calls().replace, 2);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let store = InMemoryIngressStore::new();
    store.insert(user_ingress(vec![])).unwrap();
    for _ in 0..10 {
        store.write_after_next_get("ns1", "user-ing", |ingress| {
            ingress.metadata.annotations.get_or_insert_with(Default::default).insert("peer".to_owned(), "busy".to_owned());
        });
    }
    let solver = IngressSolver::builder()
        .store(store.clone())
        .configuration(SolverConfiguration::builder().conflict_retries(2).build())
        .build();

    let error = solver.ensure_ingress(&certificate(), "solver-svc", "shared.example.com", "tok").await.unwrap_err();
    assert!(error.is_retryable());
    assert!(matches!(error, SolverError::Store(StoreError::Conflict(..))));
    assert_eq!(store.calls().replace, 3);
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let store = InMemoryIngressStore::new().with_latency(Duration::from_secs(5));
    let solver = IngressSolver::builder()
        .store(store.clone())
        .configuration(SolverConfiguration::builder().request_timeout_ms(20).build())
        .build();

    let error = solver.ensure_ingress(&certificate(), "solver-svc", "example.com", "tok").await.unwrap_err();
    assert!(matches!(error, SolverError::Store(StoreError::Timeout { operation: "create", .. })));
    assert!(error.is_retryable());
}
