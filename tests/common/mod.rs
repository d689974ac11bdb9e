#![allow(dead_code)]

use gitlab_provider::testing::ProviderTester;
use gitlab_provider::GitlabProvider;
use httpmock::MockServer;
use serde_json::json;

pub const TOKEN: &str = "glpat-test-token";

/// A tester whose provider points at `server`, skipping the auth check.
pub async fn configured_tester(server: &MockServer) -> ProviderTester<GitlabProvider> {
    let tester = ProviderTester::new(GitlabProvider::new());
    tester
        .configure(json!({
            "token": TOKEN,
            "base_url": server.base_url(),
            "early_auth_check": false
        }))
        .await
        .expect("provider configures against the mock server");
    tester
}
