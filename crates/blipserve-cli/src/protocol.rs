//! JSON bodies of the KServe v2 inference protocol.

use anyhow::{bail, ensure, Context, Result};
use blipserve_core::{DType, IOName, Shape, Tensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct InferRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub inputs: Vec<WireTensor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<RequestedOutput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestedOutput {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InferResponseBody {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    pub outputs: Vec<WireTensor>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: String,
    pub data: Vec<Value>,
}

impl WireTensor {
    pub fn from_tensor(name: &IOName, tensor: &Tensor) -> Result<Self> {
        let data: Vec<Value> = match tensor.dtype {
            DType::Bytes => tensor
                .strings()?
                .iter()
                .map(|b| Value::String(String::from_utf8_lossy(b).into_owned()))
                .collect(),
            DType::Bool => tensor.bools()?.into_iter().map(Value::Bool).collect(),
            DType::U8 => tensor.data.iter().map(|v| Value::from(*v)).collect(),
            DType::I32 => tensor.i32s()?.into_iter().map(Value::from).collect(),
            DType::I64 => tensor.i64s()?.into_iter().map(Value::from).collect(),
            DType::F32 => tensor
                .f32s()?
                .into_iter()
                .map(|v| {
                    serde_json::Number::from_f64(v as f64)
                        .map(Value::Number)
                        .with_context(|| format!("{v} cannot be represented in JSON"))
                })
                .collect::<Result<_>>()?,
            DType::F16 => bail!("FP16 tensors are not supported by the JSON protocol"),
        };

        Ok(Self {
            name: name.0.clone(),
            shape: tensor.shape.dims().to_vec(),
            datatype: tensor.dtype.wire_name().to_string(),
            data,
        })
    }

    pub fn into_tensor(self) -> Result<(IOName, Tensor)> {
        let dtype = DType::from_wire_name(&self.datatype)?;
        let shape = Shape::from_slice(&self.shape);
        let values = flatten(self.data);
        ensure!(
            values.len() == shape.numel()?,
            "output {} carries {} values for shape {:?}",
            self.name,
            values.len(),
            self.shape
        );

        let name = &self.name;
        let tensor = match dtype {
            DType::Bytes => {
                let items = values
                    .iter()
                    .map(|v| v.as_str().with_context(|| format!("{name}: expected string, got {v}")))
                    .collect::<Result<Vec<_>>>()?;
                Tensor::from_strings(shape, items)?
            }
            DType::Bool => {
                let items = values
                    .iter()
                    .map(|v| v.as_bool().with_context(|| format!("{name}: expected bool, got {v}")))
                    .collect::<Result<Vec<_>>>()?;
                Tensor::from_bools(shape, &items)?
            }
            DType::U8 => Tensor::from_u8s(shape, &integers(name, &values)?)?,
            DType::I32 => Tensor::from_i32s(shape, &integers(name, &values)?)?,
            DType::I64 => Tensor::from_i64s(shape, &integers(name, &values)?)?,
            DType::F32 => {
                let items = values
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .with_context(|| format!("{name}: expected number, got {v}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Tensor::from_f32s(shape, &items)?
            }
            DType::F16 => bail!("FP16 tensors are not supported by the JSON protocol"),
        };
        Ok((IOName(self.name), tensor))
    }
}

/// Servers may nest data row-major; flatten it.
fn flatten(values: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(inner) => out.extend(flatten(inner)),
            other => out.push(other),
        }
    }
    out
}

fn integers<T: TryFrom<i64>>(name: &str, values: &[Value]) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| {
            let raw = v
                .as_i64()
                .with_context(|| format!("{name}: expected integer, got {v}"))?;
            T::try_from(raw).map_err(|_| anyhow::anyhow!("{name}: {raw} out of range"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bytes_tensor_goes_out_as_strings() -> Result<()> {
        let tensor = Tensor::from_strings(Shape::vector(2), ["/a.jpg", "/b.jpg"])?;
        let wire = WireTensor::from_tensor(&IOName::new("IMAGE0"), &tensor)?;

        assert_eq!(
            serde_json::to_value(&wire)?,
            json!({"name": "IMAGE0", "shape": [2], "datatype": "BYTES", "data": ["/a.jpg", "/b.jpg"]})
        );
        Ok(())
    }

    #[test]
    fn request_body_omits_empty_fields() -> Result<()> {
        let body = InferRequestBody {
            id: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        assert_eq!(serde_json::to_value(&body)?, json!({"inputs": []}));
        Ok(())
    }

    #[test]
    fn response_answers_decode_from_nested_data() -> Result<()> {
        let body: InferResponseBody = serde_json::from_value(json!({
            "model_name": "blip_nlvr",
            "outputs": [{"name": "ANSWER", "shape": [2, 1], "datatype": "BYTES", "data": [["True"], ["False"]]}]
        }))?;

        let (name, tensor) = body.outputs.into_iter().next().unwrap().into_tensor()?;
        assert_eq!(name.as_str(), "ANSWER");
        assert_eq!(tensor.shape.dims(), &[2, 1]);
        assert_eq!(tensor.strings()?, vec!["True", "False"]);
        Ok(())
    }

    #[test]
    fn numeric_outputs_are_checked() -> Result<()> {
        let ok = WireTensor {
            name: "ANSWER".into(),
            shape: vec![2],
            datatype: "INT64".into(),
            data: vec![json!(1), json!(0)],
        };
        assert_eq!(ok.into_tensor()?.1.i64s()?, vec![1, 0]);

        let out_of_range = WireTensor {
            name: "ANSWER".into(),
            shape: vec![1],
            datatype: "UINT8".into(),
            data: vec![json!(300)],
        };
        assert!(out_of_range.into_tensor().is_err());

        let overflowing = WireTensor {
            name: "ANSWER".into(),
            shape: vec![usize::MAX, 2],
            datatype: "BOOL".into(),
            data: vec![json!(true)],
        };
        assert!(overflowing.into_tensor().is_err());

        let short = WireTensor {
            name: "ANSWER".into(),
            shape: vec![3],
            datatype: "BOOL".into(),
            data: vec![json!(true)],
        };
        assert!(short.into_tensor().is_err());
        Ok(())
    }
}
