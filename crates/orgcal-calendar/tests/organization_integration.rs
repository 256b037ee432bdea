//! Integration tests for organization creation, member invites and the
//! invitation queue.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::*;
use orgcal_calendar::{CalendarError, InvitationStatus, OperationStatus, OrganizationOptions, Response};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_create_calendar(server: &MockServer, summary: &str, id: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/calendars"))
        .and(body_json(serde_json::json!({ "summary": summary })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": id,
            "summary": summary
        })))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_user_list_insert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
}

async fn mount_grant(server: &MockServer, calendar_id: &str, email: &str, status: u16, times: u64) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"role": "writer"}))
    } else {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "error": {"code": status, "message": "Invalid scope value."}
        }))
    };

    Mock::given(method("POST"))
        .and(path(format!("/calendars/{}/acl", calendar_id)))
        .and(body_json(serde_json::json!({
            "role": "writer",
            "scope": {"type": "user", "value": email}
        })))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn emails(list: &str) -> Vec<String> {
    vec![list.to_string()]
}

#[tokio::test]
async fn test_create_organization_with_personal_calendars() {
    let mock_server = MockServer::start().await;
    mount_create_calendar(&mock_server, "MultiappOrg · Team · General", "G1", 1).await;
    mount_create_calendar(
        &mock_server,
        "MultiappOrg · Team · Member · bob@example.com",
        "MB",
        1,
    )
    .await;
    mount_create_calendar(
        &mock_server,
        "MultiappOrg · Team · Member · carol@example.com",
        "MC",
        1,
    )
    .await;
    mount_user_list_insert(&mock_server).await;
    mount_grant(&mock_server, "G1", "bob@example.com", 200, 1).await;
    mount_grant(&mock_server, "G1", "carol@example.com", 400, 1).await;
    mount_grant(&mock_server, "MB", "bob@example.com", 200, 1).await;
    mount_grant(&mock_server, "MC", "carol@example.com", 200, 1).await;
    mount_calendar_list(
        &mock_server,
        vec![
            calendar("G1", "MultiappOrg · Team · General", "owner"),
            calendar("MB", "MultiappOrg · Team · Member · bob@example.com", "owner"),
            calendar("MC", "MultiappOrg · Team · Member · carol@example.com", "owner"),
        ],
    )
    .await;

    let mut h = connected(&mock_server);
    let report = h
        .engine
        .create_organization(
            "  Team ",
            &emails("bob@example.com; carol@example.com, nonsense"),
            OrganizationOptions {
                create_personal_calendars: true,
                notify_by_email: false,
            },
            true,
        )
        .await
        .unwrap();

    assert!(report.created_general);
    assert_eq!(report.general_calendar_id, "G1");
    assert_eq!(report.granted.len(), 3);
    assert_eq!(report.personal_calendars.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].email, "carol@example.com");
    assert!(report.skipped[0].reason.contains("Invalid scope value."));

    match report.status() {
        OperationStatus::ItemsFailed { failed, .. } => {
            assert_eq!(failed, vec!["carol@example.com"])
        }
        other => panic!("unexpected status: {:?}", other),
    }

    // The directory is refreshed after the change.
    let team = h.engine.directory().find("Team").unwrap();
    assert_eq!(team.members.len(), 2);
    assert_eq!(h.identity.consents(), 0);
}

#[tokio::test]
async fn test_create_organization_requires_name() {
    let mock_server = MockServer::start().await;
    let mut h = connected(&mock_server);

    let result = h
        .engine
        .create_organization("   ", &[], OrganizationOptions::default(), true)
        .await;
    assert!(matches!(result, Err(CalendarError::PreconditionFailed(_))));
    assert_eq!(request_count(&mock_server).await, 0);
}

#[tokio::test]
async fn test_invite_reuses_existing_general_and_member_calendars() {
    let mock_server = MockServer::start().await;
    mount_calendar_list(
        &mock_server,
        vec![
            calendar("G1", "MultiappOrg · Team · General", "owner"),
            calendar("MB", "MultiappOrg · Team · Member · Bob@Example.com", "owner"),
        ],
    )
    .await;
    mount_create_calendar(&mock_server, "MultiappOrg · Team · General", "G_DUP", 0).await;
    mount_create_calendar(
        &mock_server,
        "MultiappOrg · Team · Member · carol@example.com",
        "MC",
        1,
    )
    .await;
    mount_user_list_insert(&mock_server).await;
    mount_grant(&mock_server, "G1", "bob@example.com", 200, 1).await;
    mount_grant(&mock_server, "G1", "carol@example.com", 200, 1).await;
    mount_grant(&mock_server, "MB", "bob@example.com", 200, 1).await;
    mount_grant(&mock_server, "MC", "carol@example.com", 200, 1).await;

    let mut h = connected(&mock_server);
    let report = h
        .engine
        .invite_members(
            "Team",
            &emails("bob@example.com carol@example.com"),
            OrganizationOptions {
                create_personal_calendars: true,
                notify_by_email: false,
            },
            false,
        )
        .await
        .unwrap();

    assert!(!report.created_general);
    assert_eq!(report.general_calendar_id, "G1");
    assert_eq!(report.personal_calendars[0].calendar_id, "MB");
    assert_eq!(report.personal_calendars[1].calendar_id, "MC");
    assert!(report.status().is_success());
}

#[tokio::test]
async fn test_invite_creates_missing_general() {
    let mock_server = MockServer::start().await;
    mount_calendar_list(&mock_server, vec![]).await;
    mount_create_calendar(&mock_server, "MultiappOrg · Club · General", "G9", 1).await;
    mount_user_list_insert(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/calendars/G9/acl"))
        .and(query_param("sendNotifications", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut h = connected(&mock_server);
    let report = h
        .engine
        .invite_members(
            "Club",
            &emails("dan@example.com"),
            OrganizationOptions {
                create_personal_calendars: false,
                notify_by_email: true,
            },
            false,
        )
        .await
        .unwrap();

    assert!(report.created_general);
    assert_eq!(report.general_calendar_id, "G9");
    assert!(report.personal_calendars.is_empty());
}

#[tokio::test]
async fn test_invite_without_valid_email_makes_no_calls() {
    let mock_server = MockServer::start().await;
    let mut h = connected(&mock_server);

    let result = h
        .engine
        .invite_members("Team", &emails("nobody, at all"), OrganizationOptions::default(), true)
        .await;
    assert!(matches!(result, Err(CalendarError::PreconditionFailed(_))));
    assert_eq!(request_count(&mock_server).await, 0);
}

#[tokio::test]
async fn test_rejected_token_aborts_grants() {
    let mock_server = MockServer::start().await;
    mount_calendar_list(
        &mock_server,
        vec![calendar("G1", "MultiappOrg · Team · General", "owner")],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/calendars/G1/acl"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut h = connected(&mock_server);
    let result = h
        .engine
        .invite_members(
            "Team",
            &emails("bob@example.com carol@example.com"),
            OrganizationOptions::default(),
            false,
        )
        .await;
    assert!(matches!(result, Err(CalendarError::RemoteAuth { status: 401 })));
}

#[tokio::test]
async fn test_queue_and_respond_stay_local() {
    let mock_server = MockServer::start().await;
    let mut h = connected(&mock_server);

    let receipt = h
        .engine
        .queue_invitations("Team", &emails("alice@example.com bob@example.com"), Some("hi"))
        .await
        .unwrap();
    assert_eq!(receipt.queued, 2);
    assert_eq!(receipt.invitations[0].from.as_deref(), Some(OWNER_EMAIL));

    let accepted = h
        .engine
        .respond_invitation(&receipt.invitations[0].id, Response::Accept)
        .unwrap();
    assert_eq!(accepted.status, InvitationStatus::Accepted);
    assert!(h.engine.selection().contains("Team"));

    let declined = h
        .engine
        .respond_invitation(&receipt.invitations[1].id, Response::Decline)
        .unwrap();
    assert_eq!(declined.status, InvitationStatus::Declined);

    assert!(h.engine.invitations().pending().is_empty());
    assert_eq!(h.engine.invitations().notifications().len(), 4);
    assert_eq!(request_count(&mock_server).await, 0);
}

#[tokio::test]
async fn test_queue_without_token_has_no_sender() {
    let mock_server = MockServer::start().await;
    let mut h = harness(&mock_server, None);

    let receipt = h
        .engine
        .queue_invitations("Team", &emails("alice@example.com"), None)
        .await
        .unwrap();
    assert!(receipt.invitations[0].from.is_none());
    assert_eq!(h.identity.consents(), 0);
}

#[tokio::test]
async fn test_send_invitation_grants_and_dequeues() {
    let mock_server = MockServer::start().await;
    mount_calendar_list(
        &mock_server,
        vec![calendar("G1", "MultiappOrg · Team · General", "owner")],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/calendars/G1/acl"))
        .and(query_param("sendNotifications", "true"))
        .and(body_json(serde_json::json!({
            "role": "writer",
            "scope": {"type": "user", "value": "alice@example.com"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    // No cached token: sending prompts once.
    let mut h = harness(&mock_server, None);
    let receipt = h
        .engine
        .queue_invitations("Team", &emails("alice@example.com"), None)
        .await
        .unwrap();

    let sent = h
        .engine
        .send_invitation(&receipt.invitations[0].id, true)
        .await
        .unwrap();
    assert_eq!(sent.email, "alice@example.com");
    assert_eq!(h.identity.consents(), 1);
    assert!(h.engine.invitations().pending().is_empty());
}

#[tokio::test]
async fn test_send_invitation_failure_keeps_invitation() {
    let mock_server = MockServer::start().await;
    mount_calendar_list(&mock_server, vec![]).await;

    let mut h = connected(&mock_server);
    let receipt = h
        .engine
        .queue_invitations("Ghost", &emails("alice@example.com"), None)
        .await
        .unwrap();

    let result = h
        .engine
        .send_invitation(&receipt.invitations[0].id, false)
        .await;
    assert!(matches!(result, Err(CalendarError::PreconditionFailed(_))));
    assert_eq!(h.engine.invitations().pending().len(), 1);
}
