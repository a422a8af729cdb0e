use anyhow::{ensure, Context, Result};
use tracing::{debug, info};

use crate::{Adapter, InferenceRequest, InferenceResponse, InitArgs};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Ready,
    Finalized,
}

/// Owns an initialized adapter and guarantees `finalize` runs exactly once.
pub struct ModelInstance<A: Adapter> {
    adapter: A,
    state: InstanceState,
}

impl<A: Adapter> ModelInstance<A> {
    pub fn load(mut adapter: A, args: &InitArgs) -> Result<Self> {
        adapter
            .initialize(args)
            .with_context(|| format!("failed to initialize {}", adapter.name()))?;
        info!(adapter = adapter.name(), model = %args.model_name, "model instance ready");
        Ok(Self {
            adapter,
            state: InstanceState::Ready,
        })
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn execute(&mut self, requests: Vec<InferenceRequest>) -> Result<Vec<InferenceResponse>> {
        ensure!(
            self.state == InstanceState::Ready,
            "{} has already been finalized",
            self.adapter.name()
        );

        let ids: Vec<Option<String>> = requests.iter().map(|r| r.id.clone()).collect();
        debug!(adapter = self.adapter.name(), batch = ids.len(), "executing batch");
        let responses = self.adapter.execute(requests);

        ensure!(
            responses.len() == ids.len(),
            "{} returned {} responses for {} requests",
            self.adapter.name(),
            responses.len(),
            ids.len()
        );
        for (idx, (resp, id)) in responses.iter().zip(&ids).enumerate() {
            ensure!(
                &resp.id == id,
                "response {idx} answers request {:?}, expected {:?}",
                resp.id,
                id
            );
        }
        Ok(responses)
    }

    pub fn finalize(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.state == InstanceState::Ready {
            self.adapter.finalize();
            self.state = InstanceState::Finalized;
        }
    }
}

impl<A: Adapter> Drop for ModelInstance<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
