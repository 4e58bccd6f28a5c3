mod common;

use serde_json::{Map, Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wl_session::{JournalEdit, MediaFile, NewAccount, ProfileUpdate, SnapshotStore};

use common::{Harness, profile_json};

fn page(results: Value) -> Value {
    json!({ "count": 1, "next": null, "previous": null, "results": results })
}

#[tokio::test]
async fn share_and_unshare() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("POST"))
        .and(path("/api/Journal/shared-journals/"))
        .and(header("Authorization", "Bearer tok"))
        .and(body_json(json!({ "journal": 5 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 31,
            "user": { "id": 7 },
            "journal": 5,
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/Journal/shared-journals/31/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let share = harness.client.share(5).await.unwrap();
    assert_eq!(share.id, 31);
    assert_eq!(share.journal, 5);
    harness.client.unshare(share.id).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn unlike_targets_the_like_record() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("POST"))
        .and(path("/api/Journal/likes/"))
        .and(body_json(json!({ "journal": 5 })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": 90, "journal": 5 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/Journal/likes/90/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let like = harness.client.like(5).await.unwrap();
    harness.client.unlike(like.id).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn edit_journal_sends_changes_as_multipart() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("PUT"))
        .and(path("/api/Journal/journals/my/4/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 4, "title": "Porto again" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let edit = JournalEdit {
        title: "Porto again".to_string(),
        content: "More bridges".to_string(),
        media: vec![MediaFile {
            file_name: "river.png".to_string(),
            mime: Some("image/png".to_string()),
            bytes: vec![0x89, 0x50],
        }],
        delete_media_ids: vec![11, 12],
    };
    let journal = harness.client.update_journal(4, &edit).await.unwrap();
    assert_eq!(journal.title, "Porto again");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"media_files\"; filename=\"river.png\""));
    assert!(body.contains("More bridges"));
    assert_eq!(body.matches("name=\"delete_media_ids\"").count(), 2);
    server.verify().await;
}

#[tokio::test]
async fn follow_lists_read_the_first_page() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("GET"))
        .and(path("/api/Users/followers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([profile_json(2, false)]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Users/following/9/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([profile_json(3, false)]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Users/suggestions/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([profile_json(4, false)]))))
        .mount(&server)
        .await;

    let followers = harness.client.followers(None).await.unwrap();
    assert_eq!(followers[0].id, 2);
    let following = harness.client.following(Some(9)).await.unwrap();
    assert_eq!(following[0].id, 3);
    let suggestions = harness.client.suggestions().await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].id, 4);
}

#[tokio::test]
async fn follow_status_is_queried_by_user() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("GET"))
        .and(path("/api/Users/follow/status/"))
        .and(query_param("followed", "9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "is_following": true })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(harness.client.is_following(9).await.unwrap());
    server.verify().await;
}

#[tokio::test]
async fn edit_profile_refreshes_the_cached_profile() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));
    harness.ctx.adopt(common::profile(7));

    let mut updated = profile_json(7, false);
    updated["full_name"] = json!("Ana Maria Lima");
    Mock::given(method("PUT"))
        .and(path("/api/Users/edit-profile/"))
        .and(body_json(json!({ "current_password": "pw", "first_name": "Ana Maria" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&server)
        .await;

    let mut changes = Map::new();
    changes.insert("first_name".to_string(), json!("Ana Maria"));
    let user = harness
        .client
        .edit_profile(&ProfileUpdate {
            current_password: "pw".to_string(),
            changes,
        })
        .await
        .unwrap();

    assert_eq!(user.display_name(), "Ana Maria Lima");
    assert_eq!(harness.ctx.current_user(), Some(user.clone()));
    assert_eq!(harness.snapshots.load().unwrap(), Some(user));
    server.verify().await;
}

#[tokio::test]
async fn admin_manages_accounts() {
    let server = MockServer::start().await;
    let harness = Harness::signed_in(&server, "tok", Some("r1"));

    Mock::given(method("POST"))
        .and(path("/api/Users/admin/users/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(profile_json(20, false)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/Users/admin/users/20/"))
        .and(body_json(json!({ "is_staff": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json(20, false)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/Users/admin/users/20/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let account = NewAccount {
        email: "rui@example.com".to_string(),
        password: "s3cret!".to_string(),
        password2: "s3cret!".to_string(),
        first_name: "Rui".to_string(),
        last_name: "Costa".to_string(),
        ..NewAccount::default()
    };
    let created = harness.client.admin_create_user(&account).await.unwrap();
    assert_eq!(created.id, 20);

    let mut fields = Map::new();
    fields.insert("is_staff".to_string(), json!(true));
    harness.client.admin_update_user(20, &fields).await.unwrap();
    harness.client.admin_delete_user(20).await.unwrap();
    server.verify().await;
}
