use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    codec,
    config::AppConfig,
    error::{CardLabError, CardLabResult},
    model::{Card, Slot},
    render::{CardRenderer, LayerKind},
    service::{InpaintClient, InpaintRequest, aligned_dimensions},
    store::ResultStore,
    surface::CardSurface,
};

/// Prompt for one slot: the configured base prompt plus a clause naming the
/// card's background color.
pub fn slot_prompt(config: &AppConfig, card: &Card) -> String {
    format!(
        "{} the center of the card is a symbol in {}",
        config.prompt, card.background_color
    )
}

/// Fail-fast check on a batch payload before any network call: one image,
/// one mask and one prompt per work item, and at least one item overall.
pub fn validate_batch_inputs(
    images: &[String],
    masks: &[String],
    prompts: &[String],
) -> CardLabResult<()> {
    if images.is_empty() {
        return Err(CardLabError::validation(
            "batch has no work: every slot already has a result",
        ));
    }
    if images.len() != masks.len() || masks.len() != prompts.len() {
        return Err(CardLabError::validation(format!(
            "batch inputs misaligned: {} images, {} masks, {} prompts",
            images.len(),
            masks.len(),
            prompts.len()
        )));
    }
    Ok(())
}

fn build_request(
    config: &AppConfig,
    card: &Card,
    id: Option<Uuid>,
) -> CardLabResult<InpaintRequest> {
    let (image, mask) = match (&card.raw_layer, &card.mask_layer) {
        (Some(image), Some(mask)) => (image.clone(), mask.clone()),
        _ => {
            return Err(CardLabError::precondition(format!(
                "card {} is missing source or mask layer",
                card.slot()
            )));
        }
    };

    let (width, height) = aligned_dimensions(config.render_width);
    Ok(InpaintRequest {
        id,
        model: config.model.id().to_string(),
        image,
        mask,
        prompt: slot_prompt(config, card),
        width,
        height,
        strength: config.tuning.strength,
        num_outputs: config.tuning.num_outputs,
        output_format: config.tuning.output_format.clone(),
        guidance_scale: config.tuning.guidance_scale,
        output_quality: config.tuning.output_quality,
        num_inference_steps: config.tuning.num_inference_steps,
    })
}

/// Outcome of a single-card run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingleOutcome {
    /// The result layer was generated and persisted.
    Completed,
    /// The request preconditions were not met; nothing was sent or written.
    Skipped,
}

/// Drives one selected card through source render, mask render and a single
/// inpainting request, then writes the result into the store.
///
/// The two renders are strictly ordered: the source artifact is captured
/// before the mask render starts. Holding `&mut self` for the whole cycle is
/// what rejects a second cycle for the same card while one is in flight.
pub struct SingleCardOrchestrator<'a, C: InpaintClient> {
    store: &'a mut ResultStore,
    client: &'a C,
    config: &'a AppConfig,
    renderer: &'a mut CardRenderer,
}

impl<'a, C: InpaintClient> SingleCardOrchestrator<'a, C> {
    pub fn new(
        store: &'a mut ResultStore,
        client: &'a C,
        config: &'a AppConfig,
        renderer: &'a mut CardRenderer,
    ) -> Self {
        Self {
            store,
            client,
            config,
            renderer,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate(&mut self, slot: Slot) -> CardLabResult<SingleOutcome> {
        self.config.validate()?;

        let mut card = self
            .store
            .get(slot.color, slot.number)
            .cloned()
            .unwrap_or_else(|| Card::new(slot.color, slot.number));

        render_layers(self.renderer, self.config, &mut card)?;

        if !card.request_ready() {
            // Permissive exit: nothing is sent and nothing is written.
            tracing::debug!(%slot, "layers incomplete, skipping inpaint request");
            return Ok(SingleOutcome::Skipped);
        }

        let request = build_request(self.config, &card, None)?;
        let response = self.client.inpaint(&request).await?;
        let output = response
            .outputs
            .first()
            .ok_or_else(|| CardLabError::service(format!("no outputs returned for {slot}")))?;

        card.result_layer = Some(codec::wrap_png_base64(&output.base64_image));
        self.store.put(slot.color, slot.number, card)?;
        Ok(SingleOutcome::Completed)
    }
}

/// What a batch run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Size of the computed work set.
    pub requested: usize,
    /// Complete slots across the grid after the run.
    pub completed: usize,
}

/// Generates missing artwork for every slot of the grid in one service
/// round trip.
///
/// Failure is all-or-nothing: the response is validated and every updated
/// card staged before the first store write, so a failed batch leaves the
/// grid exactly as it was and can simply be re-run.
pub struct BatchOrchestrator<'a, C: InpaintClient> {
    store: &'a mut ResultStore,
    client: &'a C,
    config: &'a AppConfig,
    renderer: &'a mut CardRenderer,
}

impl<'a, C: InpaintClient> BatchOrchestrator<'a, C> {
    pub fn new(
        store: &'a mut ResultStore,
        client: &'a C,
        config: &'a AppConfig,
        renderer: &'a mut CardRenderer,
    ) -> Self {
        Self {
            store,
            client,
            config,
            renderer,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_missing(&mut self) -> CardLabResult<BatchReport> {
        self.config.validate()?;

        // Work set: every slot of the grid without a complete result, in
        // stable (color, number) order. The map is owned by this run and
        // discarded when it settles.
        let mut work: BTreeMap<Slot, Card> = self
            .config
            .slots()
            .filter(|&slot| !self.store.is_complete(slot))
            .map(|slot| {
                let card = self
                    .store
                    .get(slot.color, slot.number)
                    .cloned()
                    .unwrap_or_else(|| Card::new(slot.color, slot.number));
                (slot, card)
            })
            .collect();
        tracing::debug!(work = work.len(), "computed batch work set");

        // Every work item renders source-then-mask; the payload below is
        // only built once this loop has settled, which is the barrier the
        // batch correctness depends on.
        for card in work.values_mut() {
            render_layers(self.renderer, self.config, card)?;
        }

        let images: Vec<String> = work.values().filter_map(|c| c.raw_layer.clone()).collect();
        let masks: Vec<String> = work.values().filter_map(|c| c.mask_layer.clone()).collect();
        let prompts: Vec<String> = work
            .values()
            .map(|card| slot_prompt(self.config, card))
            .collect();
        validate_batch_inputs(&images, &masks, &prompts)?;

        let requests: Vec<InpaintRequest> = work
            .values()
            .map(|card| build_request(self.config, card, Some(Uuid::new_v4())))
            .collect::<CardLabResult<_>>()?;

        let responses = self.client.inpaint_batch(&requests).await?;
        if responses.len() != requests.len() {
            return Err(CardLabError::service(format!(
                "batch response misaligned: sent {} requests, received {} results",
                requests.len(),
                responses.len()
            )));
        }

        // Stage every write before touching the store so a bad entry
        // anywhere aborts the whole batch.
        let mut staged = Vec::with_capacity(work.len());
        for ((slot, mut card), response) in work.into_iter().zip(responses) {
            let output = response.outputs.first().ok_or_else(|| {
                CardLabError::service(format!("no outputs returned for {slot}"))
            })?;
            card.result_layer = Some(codec::wrap_png_base64(&output.base64_image));
            staged.push((slot, card));
        }

        let requested = staged.len();
        for (slot, card) in staged {
            self.store.put(slot.color, slot.number, card)?;
        }

        Ok(BatchReport {
            requested,
            completed: self.store.completed_count(),
        })
    }
}

/// Two-phase render of one card: the source layer is rendered and captured
/// strictly before the mask render begins.
fn render_layers(
    renderer: &mut CardRenderer,
    config: &AppConfig,
    card: &mut Card,
) -> CardLabResult<()> {
    let mut surface = CardSurface::acquire(config.render_width)?;
    card.raw_layer = Some(renderer.render(LayerKind::Source, card, &config.style, &mut surface)?);

    let mut surface = CardSurface::acquire(config.render_width)?;
    card.mask_layer = Some(renderer.render(LayerKind::Mask, card, &config.style, &mut surface)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Color;

    #[test]
    fn prompt_names_the_background_color() {
        let config = AppConfig {
            prompt: "A base prompt.".into(),
            ..AppConfig::default()
        };
        let card = Card::new(Color::Green, 4);
        assert_eq!(
            slot_prompt(&config, &card),
            "A base prompt. the center of the card is a symbol in green"
        );
    }

    #[test]
    fn batch_inputs_must_align() {
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let two = vec!["a".to_string(), "b".to_string()];

        assert!(validate_batch_inputs(&three, &three, &three).is_ok());
        assert!(matches!(
            validate_batch_inputs(&three, &two, &three),
            Err(CardLabError::Validation(_))
        ));
        assert!(matches!(
            validate_batch_inputs(&[], &[], &[]),
            Err(CardLabError::Validation(_))
        ));
    }

    #[test]
    fn build_request_requires_both_layers() {
        let config = AppConfig::default();
        let mut card = Card::new(Color::Red, 2);
        assert!(matches!(
            build_request(&config, &card, None),
            Err(CardLabError::Precondition(_))
        ));

        card.raw_layer = Some("data:image/png;base64,AA==".into());
        assert!(matches!(
            build_request(&config, &card, None),
            Err(CardLabError::Precondition(_))
        ));

        card.mask_layer = Some("data:image/png;base64,AA==".into());
        let request = build_request(&config, &card, None).unwrap();
        assert_eq!(request.width % 8, 0);
        assert_eq!(request.height % 8, 0);
        assert_eq!(request.model, "stable-diffusion-inpainting");
    }
}
