//! Merge endpoint
//!
//! POST /api/merge-audio
//! Body: {"downloadURL": "...", "prospectName": "...", "timestamp": "..."}

use actix_web::{web, HttpResponse};
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::merge::{MergeOutcome, MergeRequestBody};
use crate::state::AppState;

/// Upload the greeting, layer it over the base script and return the result URL.
pub async fn merge_audio(state: web::Data<AppState>, body: web::Bytes) -> AppResult<HttpResponse> {
    let _active = state.begin_merge();

    let result = run_merge(&state, &body).await;
    match &result {
        Ok(outcome) => {
            debug!(
                greeting_url = %outcome.greeting.secure_url,
                transformation_url = %outcome.transformation_url,
                "Merge finished"
            );
            state.record_merge_outcome(outcome);
        }
        Err(err) => {
            if matches!(err, AppError::Internal(_)) {
                error!(error = %err, "Audio merge error");
            }
            state.record_merge_error(err);
        }
    }

    Ok(HttpResponse::Ok().json(result?.into_response()))
}

async fn run_merge(state: &AppState, body: &[u8]) -> AppResult<MergeOutcome> {
    let request = MergeRequestBody::from_slice(body)?.validate()?;
    state.merger.merge(&request).await
}

pub async fn method_not_allowed() -> AppResult<HttpResponse> {
    Err(AppError::MethodNotAllowed)
}

pub async fn not_found() -> AppResult<HttpResponse> {
    Err(AppError::NotFound("Not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure;
    use crate::media::MediaServiceError;
    use crate::merge::tests::{config_with_credentials, rejected, FakeMedia, FAKE_DELIVERY_PREFIX};
    use crate::merge::AudioMerger;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn state_with(fake: Arc<FakeMedia>, credentials: bool) -> AppState {
        let config = config_with_credentials(credentials);
        let merger = AudioMerger::new(fake, &config.media, &config.merge);
        AppState::new(config, merger)
    }

    fn jo_ann() -> Value {
        json!({
            "downloadURL": "https://x/greeting.mp3",
            "prospectName": "Jo Ann",
            "timestamp": "1700000000"
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure)
                    .default_service(web::to(not_found)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_non_post_methods_are_rejected() {
        let fake = Arc::new(FakeMedia::new());
        let app = app!(state_with(fake.clone(), true));

        for req in [
            test::TestRequest::get(),
            test::TestRequest::put(),
            test::TestRequest::delete(),
            test::TestRequest::patch(),
        ] {
            let resp = test::call_service(&app, req.uri("/api/merge-audio").to_request()).await;
            assert_eq!(resp.status(), 405);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({ "error": "Method not allowed" }));
        }

        assert!(fake.uploads.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_missing_fields_are_rejected() {
        let fake = Arc::new(FakeMedia::new());
        let app = app!(state_with(fake.clone(), false));

        for field in ["downloadURL", "prospectName", "timestamp"] {
            let mut payload = jo_ann();
            payload.as_object_mut().unwrap().remove(field);

            let req = test::TestRequest::post()
                .uri("/api/merge-audio")
                .set_json(&payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({ "error": "Missing required fields" }));
        }

        let req = test::TestRequest::post()
            .uri("/api/merge-audio")
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        assert!(fake.uploads.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_happy_path_response() {
        let fake = Arc::new(FakeMedia::new().upload_ok(3.5).upload_ok(47.5));
        let app = app!(state_with(fake, false));

        let req = test::TestRequest::post()
            .uri("/api/merge-audio")
            .set_json(jo_ann())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({
                "status": "success",
                "mergedAudioUrl": "https://res.example/Jo_Ann_full_voice_note_1700000000.mp3",
                "publicId": "Jo_Ann_full_voice_note_1700000000",
                "fileName": "Jo_Ann_voice_note_1700000000.mp3",
                "duration": 47.5,
                "greetingDuration": 3.5,
                "message": "Successfully merged audio for Jo Ann. Final duration: 47.5s"
            })
        );
    }

    #[actix_web::test]
    async fn test_render_failure_still_succeeds() {
        let fake = Arc::new(
            FakeMedia::new()
                .upload_ok(3.5)
                .upload_err(rejected("render refused")),
        );
        let app = app!(state_with(fake.clone(), true));

        let req = test::TestRequest::post()
            .uri("/api/v1/merge-audio")
            .set_json(jo_ann())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        let transformation_url = fake.uploads.lock().unwrap()[1].file.clone();
        assert!(transformation_url.starts_with(FAKE_DELIVERY_PREFIX));

        assert_eq!(body["status"], "success");
        assert_eq!(body["mergedAudioUrl"], transformation_url.as_str());
        assert!(body["publicId"].as_str().unwrap().ends_with("_direct_1700000000"));
        assert_eq!(body["duration"], Value::Null);
        assert_eq!(body["greetingDuration"], 3.5);
        assert!(fake.destroyed.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_greeting_rejection_returns_raw_error() {
        let fake = Arc::new(FakeMedia::new().upload_err(rejected(r#"{"error":"bad preset"}"#)));
        let app = app!(state_with(fake, true));

        let req = test::TestRequest::post()
            .uri("/api/merge-audio")
            .set_json(jo_ann())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains(r#"{"error":"bad preset"}"#));
    }

    #[actix_web::test]
    async fn test_unexpected_failure_body() {
        let fake = Arc::new(
            FakeMedia::new().upload_err(MediaServiceError::Transport("dns failure".to_string())),
        );
        let state = state_with(fake, false);
        let app = app!(state.clone());

        let req = test::TestRequest::post()
            .uri("/api/merge-audio")
            .set_json(jo_ann())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Failed to merge audio files");
        assert!(body["error"].as_str().unwrap().contains("dns failure"));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.merges.unexpected_failures, 1);
        assert_eq!(metrics.active_merges, 0);
    }

    #[actix_web::test]
    async fn test_cleanup_failure_keeps_success() {
        let fake = Arc::new(
            FakeMedia::new()
                .upload_ok(3.5)
                .upload_ok(47.5)
                .destroy_err(rejected("not allowed")),
        );
        let state = state_with(fake.clone(), true);
        let app = app!(state.clone());

        let req = test::TestRequest::post()
            .uri("/api/merge-audio")
            .set_json(jo_ann())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(fake.destroyed.lock().unwrap().len(), 1);
        let merges = state.get_metrics_snapshot().merges;
        assert_eq!(merges.cleanup_failures, 1);
        assert!(merges.last_cleanup_error.unwrap().contains("not allowed"));
    }

    #[actix_web::test]
    async fn test_unknown_route_is_not_found() {
        let app = app!(state_with(Arc::new(FakeMedia::new()), false));
        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
