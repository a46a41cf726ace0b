use std::time::Duration;

use sourcify_sync::{
    address::ContractAddress,
    api::{ApiClient, ClientOptions, MatchStatus, SubmissionPayload},
};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const ADDRESS: &str = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";

fn fast_options() -> ClientOptions {
    ClientOptions {
        timeout: Duration::from_secs(5),
        min_request_interval: Duration::ZERO,
        max_retries: 3,
        min_retry_delay: Duration::from_millis(10),
        try_full_match: true,
        try_partial_match: true,
    }
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(Url::parse(&server.uri()).unwrap(), 1, fast_options()).unwrap()
}

fn full_match_path() -> String {
    format!("/files/1/{ADDRESS}")
}

#[test_log::test(tokio::test)]
async fn transient_failures_retry_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let status = client.check_verified(&address).await.unwrap();

    assert_eq!(status, MatchStatus::FullMatch);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[test_log::test(tokio::test)]
async fn transient_budget_exhaustion_surfaces_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let err = client.check_verified(&address).await.unwrap_err();

    assert!(err.is_transient());
    // initial attempt plus the full retry budget
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[test_log::test(tokio::test)]
async fn rate_limited_responses_retry_under_their_own_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let status = client.check_verified(&address).await.unwrap();

    assert_eq!(status, MatchStatus::FullMatch);
    assert_eq!(client.rate_limited_count(), 1);
}

#[test_log::test(tokio::test)]
async fn not_found_probes_every_tier() {
    let server = MockServer::start().await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let status = client.check_verified(&address).await.unwrap();

    assert_eq!(status, MatchStatus::NotFound);
    // full match, any match, file tree, check-by-addresses
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[test_log::test(tokio::test)]
async fn partial_match_reported_by_any_tier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/files/any/1/{ADDRESS}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "partial",
                "files": []
            })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let status = client.check_verified(&address).await.unwrap();

    assert_eq!(status, MatchStatus::PartialMatch);
}

#[test_log::test(tokio::test)]
async fn check_by_addresses_is_the_last_resort() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/check-by-addresses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"address": ADDRESS, "chainIds": ["1"], "status": "perfect"}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let status = client.check_verified(&address).await.unwrap();

    assert_eq!(status, MatchStatus::FullMatch);
}

#[test_log::test(tokio::test)]
async fn bad_request_error_document_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(full_match_path()))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "Invalid address"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let err = client.check_verified(&address).await.unwrap_err();

    assert!(!err.is_transient());
    assert!(err.to_string().contains("Invalid address"));
}

#[test_log::test(tokio::test)]
async fn rejected_full_match_still_tries_partial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "Bytecode mismatch"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let address = ContractAddress::new(ADDRESS).unwrap();
    let payload = SubmissionPayload {
        file_name: "Token.sol".to_string(),
        source: "contract Token {}".to_string(),
        metadata_json: "{}".to_string(),
    };
    let err = client.submit(&address, &payload).await.unwrap_err();

    assert!(!err.is_transient());
    assert!(err.to_string().contains("Bytecode mismatch"));
    // Both enabled match levels were offered before giving up
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
