//! HTTP client tests against a wiremock Dependency-Track server.

use dtrack_api::models::{NewProject, ProjectRef, ProjectUpdate};
use dtrack_api::{ApiError, ClientConfig, DependencyTrackApi, DependencyTrackClient, RetryPolicy};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "odt_test_key";

fn client(server: &MockServer) -> DependencyTrackClient {
    let config = ClientConfig::new(server.uri(), API_KEY).with_retry(RetryPolicy::new(2, 0));
    DependencyTrackClient::with_http_client(&config, reqwest::Client::new())
}

fn paged_client(server: &MockServer, page_size: u32) -> DependencyTrackClient {
    let mut config = ClientConfig::new(server.uri(), API_KEY).with_retry(RetryPolicy::none());
    config.page_size = page_size;
    DependencyTrackClient::with_http_client(&config, reqwest::Client::new())
}

fn project_json(uuid: &str, name: &str) -> serde_json::Value {
    json!({ "uuid": uuid, "name": name, "classifier": "APPLICATION", "active": true })
}

const TEAM_ID: &str = "00000000-0000-4000-8000-000000000001";
const GROUP_ID: &str = "00000000-0000-4000-8000-000000000002";
const PROJECT_ID: &str = "00000000-0000-4000-8000-000000000003";

fn id(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap()
}

// ── Reads ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_teams_sends_api_key() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/team"))
        .and(header("X-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "uuid": TEAM_ID,
            "name": "Foobar",
            "permissions": [{"name": "VIEW_PORTFOLIO"}],
            "mappedOidcGroups": []
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let teams = client(&server).list_teams().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].name, "Foobar");
    assert_eq!(teams[0].permissions[0].name, "VIEW_PORTFOLIO");
}

#[tokio::test]
async fn test_list_projects_follows_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/project"))
        .and(query_param("pageNumber", "1"))
        .and(query_param("pageSize", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", "3")
                .set_body_json(json!([
                    project_json("00000000-0000-4000-8000-00000000000a", "Foo"),
                    project_json("00000000-0000-4000-8000-00000000000b", "Bar"),
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/project"))
        .and(query_param("pageNumber", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total-Count", "3")
                .set_body_json(json!([project_json(
                    "00000000-0000-4000-8000-00000000000c",
                    "Baz"
                )])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let projects = paged_client(&server, 2).list_projects().await.unwrap();
    let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Foo", "Bar", "Baz"]);
}

#[tokio::test]
async fn test_list_projects_without_total_stops_on_short_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/project"))
        .and(query_param("pageNumber", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([project_json(
            PROJECT_ID, "Only"
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let projects = paged_client(&server, 10).list_projects().await.unwrap();
    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn test_listing_ends_when_server_ignores_paging() {
    let server = MockServer::start().await;

    // Same full page whatever pageNumber says, no total header.
    Mock::given(method("GET"))
        .and(path("/api/v1/team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "uuid": TEAM_ID, "name": "Foo" },
            { "uuid": GROUP_ID, "name": "Bar" },
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let teams = paged_client(&server, 2).list_teams().await.unwrap();
    let names: Vec<_> = teams.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Foo", "Bar"]);
}

#[tokio::test]
async fn test_read_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/oidc/group"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/oidc/group"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "uuid": GROUP_ID, "name": "Foo" }])),
        )
        .mount(&server)
        .await;

    let groups = client(&server).list_oidc_groups().await.unwrap();
    assert_eq!(groups[0].name, "Foo");
}

#[tokio::test]
async fn test_read_gives_up_after_max_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/team"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).list_teams().await.unwrap_err();
    assert!(matches!(err, ApiError::MaxRetriesExceeded { attempts: 3, .. }));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/team"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).list_teams().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { status: 401, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/team"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_teams().await.unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[tokio::test]
async fn test_acl_enabled_reads_config_property() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/configProperty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"groupName": "general", "propertyName": "base.url", "propertyValue": "x"},
            {"groupName": "access-management", "propertyName": "acl.enabled", "propertyValue": "false"}
        ])))
        .mount(&server)
        .await;

    assert!(!client(&server).acl_enabled().await.unwrap());
}

// ── Writes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_team() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/team"))
        .and(body_json(json!({ "name": "Foobar" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "uuid": TEAM_ID, "name": "Foobar" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let team = client(&server).create_team("Foobar").await.unwrap();
    assert_eq!(team.uuid, id(TEAM_ID));
}

#[tokio::test]
async fn test_delete_team_sends_uuid_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/team"))
        .and(body_json(json!({ "uuid": TEAM_ID })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_team(id(TEAM_ID)).await.unwrap();
}

#[tokio::test]
async fn test_add_permission_accepts_not_modified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/api/v1/permission/BOM_UPLOAD/team/{TEAM_ID}")))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .add_permission(id(TEAM_ID), "BOM_UPLOAD")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_link_and_unlink_oidc_group() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/oidc/mapping"))
        .and(body_json(json!({ "team": TEAM_ID, "group": GROUP_ID })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!(
            "/api/v1/oidc/group/{GROUP_ID}/team/{TEAM_ID}/mapping"
        )))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client
        .link_oidc_group(id(TEAM_ID), id(GROUP_ID))
        .await
        .unwrap();
    client
        .unlink_oidc_group(id(TEAM_ID), id(GROUP_ID))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_project_with_parent() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/project"))
        .and(body_json(json!({
            "name": "FoobarContainer",
            "classifier": "CONTAINER",
            "parent": { "uuid": PROJECT_ID },
            "active": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "uuid": "00000000-0000-4000-8000-0000000000ff",
            "name": "FoobarContainer",
            "classifier": "CONTAINER",
            "parent": { "uuid": PROJECT_ID }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_project(&NewProject {
            name: "FoobarContainer".into(),
            version: None,
            classifier: "CONTAINER".into(),
            parent: Some(ProjectRef::new(id(PROJECT_ID))),
            active: true,
        })
        .await
        .unwrap();
    assert_eq!(created.parent.map(|p| p.uuid), Some(id(PROJECT_ID)));
}

#[tokio::test]
async fn test_update_project_detaches_parent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/project"))
        .and(body_json(json!({
            "uuid": PROJECT_ID,
            "name": "Foo",
            "classifier": "LIBRARY",
            "parent": null,
            "active": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(PROJECT_ID, "Foo")))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_project(&ProjectUpdate {
            uuid: id(PROJECT_ID),
            name: "Foo".into(),
            version: None,
            classifier: Some("LIBRARY".into()),
            parent: None,
            active: true,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_write_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/acl/mapping"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .add_acl_mapping(id(TEAM_ID), id(PROJECT_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_create_conflict_is_typed() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/oidc/group"))
        .respond_with(ResponseTemplate::new(409).set_body_string("group exists"))
        .mount(&server)
        .await;

    let err = client(&server).create_oidc_group("Foo").await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(ref body) if body == "group exists"));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_remove_acl_mapping_path() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!(
            "/api/v1/acl/mapping/team/{TEAM_ID}/project/{PROJECT_ID}"
        )))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .remove_acl_mapping(id(TEAM_ID), id(PROJECT_ID))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_enable_acl_posts_aggregate() {
    let server = MockServer::start().await;

    let body = json!([{
        "groupName": "access-management",
        "propertyName": "acl.enabled",
        "propertyValue": "true"
    }]);

    Mock::given(method("POST"))
        .and(path("/api/v1/configProperty/aggregate"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).enable_acl().await.unwrap();
}
