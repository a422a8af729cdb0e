use blipserve_core::{IOName, InferError, Tensor};

#[derive(Clone, Debug)]
pub struct InferenceRequest {
    pub id: Option<String>,
    pub inputs: Vec<(IOName, Tensor)>,
}

impl InferenceRequest {
    pub fn new(id: Option<String>, inputs: Vec<(IOName, Tensor)>) -> Self {
        Self { id, inputs }
    }

    pub fn input(&self, name: &str) -> Result<&Tensor, InferError> {
        self.inputs
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, t)| t)
            .ok_or_else(|| InferError::MissingInput(name.to_string()))
    }
}

/// Exactly one per request, in request order.
#[derive(Clone, Debug)]
pub struct InferenceResponse {
    pub id: Option<String>,
    pub result: Result<Vec<(IOName, Tensor)>, InferError>,
    pub backend_us: u64,
}

impl InferenceResponse {
    pub fn ok(id: Option<String>, outputs: Vec<(IOName, Tensor)>, backend_us: u64) -> Self {
        Self {
            id,
            result: Ok(outputs),
            backend_us,
        }
    }

    pub fn err(id: Option<String>, error: InferError) -> Self {
        Self {
            id,
            result: Err(error),
            backend_us: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output(&self, name: &str) -> Option<&Tensor> {
        self.result
            .as_ref()
            .ok()?
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, t)| t)
    }
}
