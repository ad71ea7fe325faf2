//! End-to-end relay flow against a scripted backend: denial, redemption,
//! consumption-only-on-success, warning placement.

mod common;
use common::*;

use relaybot::db::queries;
use relaybot::relay;

#[tokio::test]
async fn new_user_full_lifecycle() {
    let state = test_state();
    let backend = StubBackend::replying("Here is your answer.");
    let user_id = 500;

    // 1. New user: denied with the no-package reason.
    let reply = relay::handle_message(&state, &backend, user_id, "hello").await;
    assert!(reply.contains("don't have an active package"), "{reply}");

    // 2. Redeem a generic code via /start.
    let reply = relay::handle_start(&state, user_id, Some("ABC123"));
    assert!(reply.contains("Access activated"), "{reply}");
    {
        let conn = state.db.get().unwrap();
        let ent = queries::get_entitlement(&conn, user_id).unwrap().unwrap();
        assert_eq!(ent.plan_capacity, 100);
        assert!(ent.expires_at.is_some());
    }

    // 3. Message now goes through, gets charged, and carries no warning
    //    (remaining 99 matches no threshold).
    let reply = relay::handle_message(&state, &backend, user_id, "hello").await;
    assert_eq!(reply, "Here is your answer.");
    {
        let conn = state.db.get().unwrap();
        let ent = queries::get_entitlement(&conn, user_id).unwrap().unwrap();
        assert_eq!(ent.plan_used, 1);
        assert_eq!(ent.lifetime_used, 1);
    }
}

#[tokio::test]
async fn failed_backend_call_is_not_charged() {
    let state = test_state();
    let backend = StubBackend::failing();
    let user_id = 501;

    relay::handle_start(&state, user_id, Some("CODE-F"));

    let reply = relay::handle_message(&state, &backend, user_id, "hello").await;
    assert!(reply.contains("status 500"), "{reply}");

    let conn = state.db.get().unwrap();
    let ent = queries::get_entitlement(&conn, user_id).unwrap().unwrap();
    assert_eq!(ent.plan_used, 0, "failed call must not consume a request");
}

#[tokio::test]
async fn warning_is_appended_at_exact_threshold() {
    let state = test_state();
    let backend = StubBackend::replying("ok");
    let user_id = 502;

    relay::handle_start(&state, user_id, Some("CODE-W"));
    {
        // Walk usage to 89 so the next consumption lands exactly on
        // remaining = 10.
        let conn = state.db.get().unwrap();
        for _ in 0..89 {
            queries::record_consumption(&conn, user_id, NOW).unwrap();
        }
    }

    let reply = relay::handle_message(&state, &backend, user_id, "q").await;
    assert!(reply.starts_with("ok\n\n"), "{reply}");
    assert!(reply.contains("10 requests left out of 100"), "{reply}");

    // One step further: remaining 9 matches no threshold, clean reply.
    let reply = relay::handle_message(&state, &backend, user_id, "q").await;
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn exhausted_user_is_denied_with_exhausted_reason() {
    let state = test_state();
    let backend = StubBackend::replying("ok");
    let user_id = 503;

    relay::handle_start(&state, user_id, Some("CODE-E"));
    {
        let conn = state.db.get().unwrap();
        for _ in 0..100 {
            queries::record_consumption(&conn, user_id, NOW).unwrap();
        }
    }

    let reply = relay::handle_message(&state, &backend, user_id, "q").await;
    assert!(reply.contains("used up all requests"), "{reply}");
}

#[tokio::test]
async fn start_without_code_greets_and_shows_standing() {
    let state = test_state();
    let user_id = 504;

    let reply = relay::handle_start(&state, user_id, None);
    assert!(reply.contains("Welcome"), "{reply}");
    assert!(reply.contains("don't have active access"), "{reply}");

    relay::handle_start(&state, user_id, Some("CODE-S"));
    let reply = relay::handle_start(&state, user_id, None);
    assert!(reply.contains("access is active"), "{reply}");
    assert!(reply.contains("100 of 100"), "{reply}");
}

#[tokio::test]
async fn start_routes_paid_codes_by_prefix() {
    let state = test_state();
    let user_id = 505;

    // A malformed paid-family string hits the paid path's format check
    // instead of being minted as a generic code.
    let reply = relay::handle_start(&state, user_id, Some("PAID-12x4"));
    assert!(reply.contains("Invalid code format"), "{reply}");

    let reply = relay::handle_start(&state, user_id, Some("PAID-123456"));
    assert!(reply.contains("Access activated"), "{reply}");
}

#[tokio::test]
async fn profile_reflects_counters() {
    let state = test_state();
    let user_id = 506;

    let text = relay::handle_profile(&state, user_id);
    assert!(text.contains("Status: Inactive"), "{text}");

    relay::handle_start(&state, user_id, Some("CODE-P"));
    let text = relay::handle_profile(&state, user_id);
    assert!(text.contains("Status: Active"), "{text}");
    assert!(text.contains("Requests in package: 100"), "{text}");
}

#[tokio::test]
async fn new_dialog_reports_reset() {
    let backend = StubBackend::replying("unused");
    let reply = relay::handle_new_dialog(&backend, 507).await;
    assert!(reply.contains("new dialog"), "{reply}");
}
