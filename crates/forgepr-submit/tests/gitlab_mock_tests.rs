//! HTTP mock tests for the GitLab provider.

use forgepr_changeset::{Action, Branch};
use forgepr_submit::http::HttpSession;
use forgepr_submit::providers::GitLabProvider;
use forgepr_submit::{pull_request, tree, GitProvider, ReadOptions, SubmitError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "/projects/acme%2Fwidgets";

fn provider(server: &MockServer) -> GitLabProvider {
    GitLabProvider::new(
        HttpSession::new(&server.uri(), "gl-token").unwrap(),
        "acme/widgets",
    )
}

fn commit_body(id: &str, message: &str) -> serde_json::Value {
    json!({
        "id": id,
        "message": message,
        "author_name": "Jo",
        "author_email": "jo@example.com",
        "authored_date": "2024-05-01T10:00:00.000+02:00"
    })
}

fn mr_body(iid: u64, title: &str) -> serde_json::Value {
    json!({
        "iid": iid,
        "title": title,
        "description": null,
        "web_url": format!("https://gitlab.com/acme/widgets/-/merge_requests/{}", iid),
        "source_branch": "feature",
        "target_branch": "main"
    })
}

async fn mount_branch(server: &MockServer, name_encoded: &str, name: &str, sha: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/branches/{}", PROJECT, name_encoded)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": name, "commit": { "id": sha } })),
        )
        .mount(server)
        .await;
}

// =============================================================================
// Branches
// =============================================================================

#[tokio::test]
async fn branch_names_with_slashes_are_encoded() {
    let server = MockServer::start().await;
    mount_branch(&server, "forgepr%2Ffeature", "forgepr/feature", "c1").await;

    let branch = provider(&server).get_branch("forgepr/feature").await.unwrap();
    assert_eq!(branch, Some(Branch::new("forgepr/feature", "c1")));
}

#[tokio::test]
async fn create_branch_existing_name_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/repository/branches", PROJECT)))
        .and(query_param("branch", "feature"))
        .and(query_param("ref", "c1"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Branch already exists" })),
        )
        .mount(&server)
        .await;

    let err = provider(&server).create_branch("feature", "c1").await.unwrap_err();
    assert!(matches!(err, SubmitError::BranchAlreadyExists { .. }));
}

#[tokio::test]
async fn delete_missing_branch_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/repository/branches/feature", PROJECT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "404 Branch Not Found" })))
        .mount(&server)
        .await;

    let err = provider(&server).delete_branch("feature").await.unwrap_err();
    assert!(matches!(err, SubmitError::BranchNotFound { .. }));
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn tree_listing_follows_link_pagination() {
    let server = MockServer::start().await;
    let tree_path = format!("{}/repository/tree", PROJECT);
    Mock::given(method("GET"))
        .and(path(tree_path.clone()))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "path": "deploy/b.yaml", "type": "blob" }])),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(tree_path.clone()))
        .and(query_param("recursive", "true"))
        .and(query_param("path", "deploy"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "link",
                    format!("<{}{}?page=2&recursive=true>; rel=\"next\"", server.uri(), tree_path).as_str(),
                )
                .set_body_json(json!([
                    { "path": "deploy/a.yaml", "type": "blob" },
                    { "path": "deploy/nested", "type": "tree" }
                ])),
        )
        .mount(&server)
        .await;

    let entries = provider(&server)
        .list_tree(&Branch::new("main", "c1"), Some("deploy"), true)
        .await
        .unwrap();
    let files: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_file())
        .map(|e| e.path.as_str())
        .collect();
    assert_eq!(files, vec!["deploy/a.yaml", "deploy/b.yaml"]);
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn reader_fetches_raw_files_for_scope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/tree", PROJECT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "path": "deploy/app.yaml", "type": "blob" },
            { "path": "deploy/db.yaml", "type": "blob" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/files/deploy%2Fapp.yaml/raw", PROJECT)))
        .and(query_param("ref", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("replicas: 1"))
        .mount(&server)
        .await;
    // Deleted between listing and fetch.
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/files/deploy%2Fdb.yaml/raw", PROJECT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "404 File Not Found" })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let files = tree::list(
        &provider,
        &Branch::new("main", "c1"),
        &ReadOptions::recursive().with_scope(Some("deploy")),
    )
    .await
    .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files["app.yaml"], "replicas: 1");
}

// =============================================================================
// Commit transaction
// =============================================================================

#[tokio::test]
async fn commit_posts_one_action_list_with_verbs_from_current_tree() {
    let server = MockServer::start().await;
    mount_branch(&server, "feature", "feature", "c1").await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/tree", PROJECT)))
        .and(query_param("ref", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "path": "a.txt", "type": "blob" },
            { "path": "old.txt", "type": "blob" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/repository/commits", PROJECT)))
        .and(body_partial_json(json!({ "branch": "feature", "commit_message": "sync" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(commit_body("c2", "sync")))
        .expect(1)
        .mount(&server)
        .await;

    // a.txt was absent when read but has appeared since.
    let actions = vec![
        Action::create("a.txt", "A"),
        Action::create("b.txt", "B"),
        Action::delete("old.txt"),
        Action::delete("ghost.txt"),
    ];
    let commit = provider(&server)
        .commit(&Branch::new("feature", "c1"), &actions, "sync")
        .await
        .unwrap();
    assert_eq!(commit.sha, "c2");
    assert_eq!(commit.author.name, "Jo");

    let requests = server.received_requests().await.unwrap();
    let post = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
    assert_eq!(
        body["actions"],
        json!([
            { "action": "update", "file_path": "a.txt", "content": "A" },
            { "action": "create", "file_path": "b.txt", "content": "B" },
            { "action": "delete", "file_path": "old.txt" }
        ])
    );
}

#[tokio::test]
async fn delete_raced_away_after_tree_check_returns_head() {
    let server = MockServer::start().await;
    mount_branch(&server, "feature", "feature", "c1").await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/tree", PROJECT)))
        .and(query_param("ref", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "path": "old.txt", "type": "blob" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/repository/commits", PROJECT)))
        .and(body_partial_json(json!({
            "actions": [{ "action": "delete", "file_path": "old.txt" }]
        })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "A file with this name doesn't exist"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/commits/c1", PROJECT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(commit_body("c1", "base")))
        .expect(1)
        .mount(&server)
        .await;

    let commit = provider(&server)
        .commit(&Branch::new("feature", "c1"), &[Action::delete("old.txt")], "rm")
        .await
        .unwrap();
    assert_eq!(commit.sha, "c1");
    assert_eq!(commit.message, "base");
}

#[tokio::test]
async fn commit_rejection_is_commit_failure() {
    let server = MockServer::start().await;
    mount_branch(&server, "feature", "feature", "c1").await;
    Mock::given(method("GET"))
        .and(path(format!("{}/repository/tree", PROJECT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/repository/commits", PROJECT)))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "403 Forbidden" })),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .commit(&Branch::new("feature", "c1"), &[Action::create("a.txt", "a")], "x")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::CommitFailed { ref upstream, .. } if upstream.status == Some(403)
    ));
}

// =============================================================================
// Merge requests
// =============================================================================

#[tokio::test]
async fn conflicting_merge_request_is_updated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/merge_requests", PROJECT)))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": ["Another open merge request already exists for this source branch: !3"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/merge_requests", PROJECT)))
        .and(query_param("state", "opened"))
        .and(query_param("source_branch", "feature"))
        .and(query_param("target_branch", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([mr_body(3, "Old")])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/merge_requests/3", PROJECT)))
        .and(body_partial_json(json!({ "title": "New", "description": "d" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(mr_body(3, "New")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let mr = pull_request::create_or_update(&provider, "feature", "main", "New", "d")
        .await
        .unwrap();
    assert_eq!(mr.id, "3");
    assert_eq!(mr.title, "New");
}

#[tokio::test]
async fn created_merge_request_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/merge_requests", PROJECT)))
        .and(body_partial_json(json!({ "source_branch": "feature", "target_branch": "main" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(mr_body(4, "T")))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let mr = pull_request::create_or_update(&provider, "feature", "main", "T", "")
        .await
        .unwrap();
    assert_eq!(mr.id, "4");
    assert_eq!(mr.link, "https://gitlab.com/acme/widgets/-/merge_requests/4");
}
