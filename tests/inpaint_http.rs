//! HTTP client round trips against a canned local service.

use std::io::Read as _;
use std::thread;

use cardlab::{CardLabError, HttpInpaintClient, InpaintClient, InpaintRequest};
use tiny_http::{Response, Server};

fn request_fixture(prompt: &str) -> InpaintRequest {
    InpaintRequest {
        id: None,
        model: "stable-diffusion-inpainting".to_string(),
        image: "data:image/png;base64,AA==".to_string(),
        mask: "data:image/png;base64,AA==".to_string(),
        prompt: prompt.to_string(),
        width: 512,
        height: 768,
        strength: 1.0,
        num_outputs: 1,
        output_format: "png".to_string(),
        guidance_scale: 7.0,
        output_quality: 90,
        num_inference_steps: 30,
    }
}

/// Serve `responses` one request at a time and hand back the observed
/// (url, body) pairs once the server thread finishes.
fn serve_canned(
    responses: Vec<(u16, String)>,
) -> (String, thread::JoinHandle<Vec<(String, String)>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let mut request = server.recv().unwrap();
            let mut content = String::new();
            request.as_reader().read_to_string(&mut content).unwrap();
            seen.push((request.url().to_string(), content));

            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    "Content-Type: application/json"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
            let _ = request.respond(response);
        }
        seen
    });

    (base, handle)
}

#[tokio::test]
async fn single_inpaint_round_trips() {
    let (base, handle) = serve_canned(vec![(
        200,
        r#"{"id":"abc","prompt":"p","outputs":[{"base64_image":"QUJD"}]}"#.to_string(),
    )]);

    let client = HttpInpaintClient::new(&base);
    let response = client.inpaint(&request_fixture("p")).await.unwrap();
    assert_eq!(response.id, "abc");
    assert_eq!(response.outputs[0].base64_image, "QUJD");

    let seen = handle.join().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "/inpaint");

    let body: serde_json::Value = serde_json::from_str(&seen[0].1).unwrap();
    assert_eq!(body["model"], "stable-diffusion-inpainting");
    assert_eq!(body["width"], 512);
    assert_eq!(body["num_inference_steps"], 30);
    assert!(body.get("id").is_none());
}

#[tokio::test]
async fn batch_inpaint_round_trips_in_order() {
    let (base, handle) = serve_canned(vec![(
        200,
        r#"[
            {"id":"a","prompt":"one","outputs":[{"base64_image":"QQ=="}]},
            {"id":"b","prompt":"two","outputs":[{"base64_image":"Qg=="}]}
        ]"#
        .to_string(),
    )]);

    let client = HttpInpaintClient::new(&base);
    let requests = vec![request_fixture("one"), request_fixture("two")];
    let responses = client.inpaint_batch(&requests).await.unwrap();

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].outputs[0].base64_image, "QQ==");
    assert_eq!(responses[1].outputs[0].base64_image, "Qg==");

    let seen = handle.join().unwrap();
    assert_eq!(seen[0].0, "/inpaint/batch");
    let body: serde_json::Value = serde_json::from_str(&seen[0].1).unwrap();
    let sent = body["requests"].as_array().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["prompt"], "one");
    assert_eq!(sent[1]["prompt"], "two");
}

#[tokio::test]
async fn non_success_status_is_a_service_error() {
    let (base, handle) = serve_canned(vec![(500, r#"{"message":"boom"}"#.to_string())]);

    let client = HttpInpaintClient::new(&base);
    let err = client.inpaint(&request_fixture("p")).await.unwrap_err();
    assert!(matches!(err, CardLabError::Service(_)));
    assert!(err.to_string().contains("500"));

    handle.join().unwrap();
}

#[tokio::test]
async fn malformed_body_is_a_service_error() {
    let (base, handle) = serve_canned(vec![(200, "not json".to_string())]);

    let client = HttpInpaintClient::new(&base);
    let err = client.inpaint(&request_fixture("p")).await.unwrap_err();
    assert!(matches!(err, CardLabError::Service(_)));

    handle.join().unwrap();
}
