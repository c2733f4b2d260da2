use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{CardLabError, CardLabResult};

/// Round to the nearest multiple of `multiple`, halves up. The inpainting
/// models only accept dimensions aligned to 8 pixels.
pub fn round_to_multiple(n: u32, multiple: u32) -> u32 {
    ((n + multiple / 2) / multiple) * multiple
}

/// Request dimensions for a configured render width: width and the
/// 1.5-aspect height, each independently aligned to 8.
pub fn aligned_dimensions(render_width: u32) -> (u32, u32) {
    (
        round_to_multiple(render_width, 8),
        round_to_multiple(crate::surface::card_height(render_width), 8),
    )
}

/// One inpainting request as the service expects it on the wire.
#[derive(Clone, Debug, serde::Serialize)]
pub struct InpaintRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub model: String,
    pub image: String,
    pub mask: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub strength: f32,
    pub num_outputs: u32,
    pub output_format: String,
    pub guidance_scale: f32,
    pub output_quality: u32,
    pub num_inference_steps: u32,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct InpaintOutput {
    pub base64_image: String,
}

/// Success payload of one request: an identifier, the prompt it ran with,
/// and at least one output image.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct InpaintResponse {
    pub id: String,
    pub prompt: String,
    pub outputs: Vec<InpaintOutput>,
}

#[derive(serde::Serialize)]
struct BatchBody<'a> {
    requests: &'a [InpaintRequest],
}

/// Seam between the orchestrators and the external inpainting service.
#[async_trait]
pub trait InpaintClient: Send + Sync {
    async fn inpaint(&self, request: &InpaintRequest) -> CardLabResult<InpaintResponse>;

    /// One round trip for many requests. The response array is ordered like
    /// the request array; alignment is checked by the caller.
    async fn inpaint_batch(
        &self,
        requests: &[InpaintRequest],
    ) -> CardLabResult<Vec<InpaintResponse>>;
}

/// HTTP client against the inpainting service's `/inpaint` endpoints.
#[derive(Clone, Debug)]
pub struct HttpInpaintClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpInpaintClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> CardLabResult<T>
    where
        B: serde::Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CardLabError::service(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CardLabError::service(format!(
                "POST {url} returned {status}: {detail}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CardLabError::service(format!("decode response of POST {url}: {e}")))
    }
}

#[async_trait]
impl InpaintClient for HttpInpaintClient {
    #[tracing::instrument(skip(self, request), fields(prompt_len = request.prompt.len()))]
    async fn inpaint(&self, request: &InpaintRequest) -> CardLabResult<InpaintResponse> {
        self.post_json("/inpaint", request).await
    }

    #[tracing::instrument(skip(self, requests), fields(count = requests.len()))]
    async fn inpaint_batch(
        &self,
        requests: &[InpaintRequest],
    ) -> CardLabResult<Vec<InpaintResponse>> {
        self.post_json("/inpaint/batch", &BatchBody { requests })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_multiple_is_aligned_and_close() {
        for width in [1u32, 4, 5, 300, 301, 511, 512, 513, 767, 1024] {
            let (w, h) = aligned_dimensions(width);
            assert_eq!(w % 8, 0);
            assert_eq!(h % 8, 0);
            assert!(w.abs_diff(width) <= 4, "width {width} -> {w}");
            assert!(h.abs_diff(crate::surface::card_height(width)) <= 4);
        }
    }

    #[test]
    fn round_to_multiple_rounds_halves_up() {
        assert_eq!(round_to_multiple(4, 8), 8);
        assert_eq!(round_to_multiple(3, 8), 0);
        assert_eq!(round_to_multiple(12, 8), 16);
        assert_eq!(round_to_multiple(11, 8), 8);
    }

    #[test]
    fn request_serializes_wire_field_names() {
        let request = InpaintRequest {
            id: None,
            model: "stable-diffusion-inpainting".into(),
            image: "img".into(),
            mask: "msk".into(),
            prompt: "p".into(),
            width: 512,
            height: 768,
            strength: 1.0,
            num_outputs: 1,
            output_format: "png".into(),
            guidance_scale: 7.0,
            output_quality: 90,
            num_inference_steps: 30,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["model"], "stable-diffusion-inpainting");
        assert_eq!(value["num_inference_steps"], 30);
        assert_eq!(value["guidance_scale"], 7.0);
    }

    #[test]
    fn response_deserializes_service_payload() {
        let payload = r#"{
            "id": "abc",
            "prompt": "a card",
            "outputs": [{"base64_image": "aGk="}]
        }"#;
        let response: InpaintResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.outputs.len(), 1);
        assert_eq!(response.outputs[0].base64_image, "aGk=");
    }
}
