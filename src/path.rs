use std::sync::Arc;

use k8s_openapi::api::networking::v1::{HTTPIngressPath, IngressBackend, IngressServiceBackend, ServiceBackendPort};

/// Base path every HTTP-01 validation request is sent to.
pub const HTTP_CHALLENGE_PATH: &str = "/.well-known/acme-challenge";
pub const ACME_SOLVER_LISTEN_PORT: i32 = 8089;
pub const CHALLENGE_PATH_TYPE: &str = "ImplementationSpecific";

pub trait ChallengePathFormatter: Send + Sync {
    fn challenge_path(&self, token: &str) -> String;

    /// Whether `path` was produced by [`ChallengePathFormatter::challenge_path`] for some token.
    ///
    /// The default assumes the token is the last part of the path.
    fn is_challenge_path(&self, path: &str) -> bool {
        let base = self.challenge_path("");
        path.len() > base.len() && path.starts_with(&base)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WellKnownChallengePath;

impl ChallengePathFormatter for WellKnownChallengePath {
    fn challenge_path(&self, token: &str) -> String {
        format!("{HTTP_CHALLENGE_PATH}/{token}")
    }
}

/// Maps challenge tokens to the ingress paths that route them to the solver service.
#[derive(Clone)]
pub struct PathCodec {
    formatter: Arc<dyn ChallengePathFormatter>,
    listen_port: i32,
}

impl Default for PathCodec {
    fn default() -> Self {
        Self::new(Arc::new(WellKnownChallengePath), ACME_SOLVER_LISTEN_PORT)
    }
}

impl std::fmt::Debug for PathCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathCodec").field("listen_port", &self.listen_port).finish_non_exhaustive()
    }
}

impl PathCodec {
    pub fn new(formatter: Arc<dyn ChallengePathFormatter>, listen_port: i32) -> Self {
        Self { formatter, listen_port }
    }

    pub fn with_listen_port(self, listen_port: i32) -> Self {
        Self { listen_port, ..self }
    }

    pub fn listen_port(&self) -> i32 {
        self.listen_port
    }

    pub fn challenge_path(&self, token: &str) -> String {
        self.formatter.challenge_path(token)
    }

    pub fn is_challenge_path(&self, path: &str) -> bool {
        self.formatter.is_challenge_path(path)
    }

    pub fn route_entry(&self, token: &str, service_name: &str) -> HTTPIngressPath {
        HTTPIngressPath {
            path: Some(self.challenge_path(token)),
            path_type: CHALLENGE_PATH_TYPE.to_owned(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: service_name.to_owned(),
                    port: Some(ServiceBackendPort { number: Some(self.listen_port), name: None }),
                }),
                resource: None,
            },
        }
    }
}
