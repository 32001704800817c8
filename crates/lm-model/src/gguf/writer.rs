use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use lm_tensor::{DType, Tensor};

use super::align;
use super::header::{GgufHeader, GGUF_VERSION};
use super::metadata::{write_gguf_string, GgufMetadataValue};
use super::tensor_info::GgufTensorInfo;
use crate::error::{ModelError, Result};

/// Builds a GGUF file from metadata entries and f32 tensors.
///
/// Entries are written in insertion order. Each tensor's data is padded to
/// `GGUF_DEFAULT_ALIGNMENT` within the data section, which is what
/// `GgufFile::open` expects.
#[derive(Default)]
pub struct GgufWriter {
    metadata: Vec<(String, GgufMetadataValue)>,
    tensors: Vec<(String, Tensor, DType)>,
}

impl GgufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metadata entry, replacing an earlier entry with the same key.
    pub fn add_metadata(&mut self, key: &str, value: GgufMetadataValue) -> &mut Self {
        self.metadata.retain(|(k, _)| k != key);
        self.metadata.push((key.to_string(), value));
        self
    }

    /// Add a tensor stored as `dtype` on disk.
    pub fn add_tensor(&mut self, name: &str, tensor: &Tensor, dtype: DType) -> &mut Self {
        self.tensors.retain(|(n, _, _)| n != name);
        self.tensors.push((name.to_string(), tensor.clone(), dtype));
        self
    }

    /// Serialize the whole file.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        let header = GgufHeader {
            version: GGUF_VERSION,
            n_tensors: self.tensors.len() as u64,
            n_kv: self.metadata.len() as u64,
        };

        let mut head = Vec::new();
        header.write(&mut head)?;
        for (key, value) in &self.metadata {
            write_gguf_string(&mut head, key)?;
            value.write(&mut head)?;
        }

        let mut data = Vec::new();
        for (name, tensor, dtype) in &self.tensors {
            let offset = align(data.len());
            data.resize(offset, 0);
            data.extend_from_slice(&tensor.storage().encode_le(*dtype));

            let info = GgufTensorInfo {
                name: name.clone(),
                dims: tensor.shape().dims().iter().map(|&d| d as u64).collect(),
                dtype: *dtype,
                offset: offset as u64,
            };
            info.write(&mut head)?;
        }

        let padding = align(head.len()) - head.len();
        head.resize(head.len() + padding, 0);

        writer.write_all(&head)?;
        writer.write_all(&data)?;
        Ok(())
    }

    /// Write the file to `path`, creating or truncating it.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush().map_err(ModelError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::GgufFile;
    use lm_tensor::Shape;

    #[test]
    fn test_written_file_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");

        let weight = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![3, 2]));
        let bias = Tensor::new(vec![0.5, -0.5, 0.25], Shape::new(vec![3]));

        let mut w = GgufWriter::new();
        w.add_metadata("general.architecture", GgufMetadataValue::String("rnnlm".into()))
            .add_metadata("rnnlm.vocab_size", GgufMetadataValue::U32(3))
            .add_tensor("output.weight", &weight, DType::F32)
            .add_tensor("output.bias", &bias, DType::F16);
        w.write_file(&path).unwrap();

        let file = GgufFile::open(&path).unwrap();
        assert_eq!(file.header.n_tensors, 2);
        assert_eq!(file.metadata.get_string("general.architecture").unwrap(), "rnnlm");
        assert_eq!(file.metadata.get_usize("rnnlm.vocab_size").unwrap(), 3);
        assert_eq!(file.get_tensor_f32("output.weight").unwrap(), weight);
        assert_eq!(file.get_tensor_f32("output.bias").unwrap().data_f32(), bias.data_f32());
        assert!(file.get_optional_tensor_f32("proj.weight").unwrap().is_none());
    }

    #[test]
    fn test_tensor_offsets_are_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aligned.gguf");

        let odd = Tensor::new(vec![1.0; 3], Shape::new(vec![3]));
        let mut w = GgufWriter::new();
        w.add_tensor("a", &odd, DType::F32).add_tensor("b", &odd, DType::F32);
        w.write_file(&path).unwrap();

        let file = GgufFile::open(&path).unwrap();
        for info in &file.tensor_infos {
            assert_eq!(info.offset % 32, 0);
        }
        assert_eq!(file.tensor_infos[1].offset, 32);
    }

    #[test]
    fn test_duplicate_keys_replaced() {
        let mut w = GgufWriter::new();
        w.add_metadata("k", GgufMetadataValue::U32(1))
            .add_metadata("k", GgufMetadataValue::U32(2));
        assert_eq!(w.metadata.len(), 1);
        assert_eq!(w.metadata[0].1, GgufMetadataValue::U32(2));
    }

    #[test]
    fn test_truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.gguf");

        let t = Tensor::new(vec![1.0; 64], Shape::new(vec![8, 8]));
        let mut w = GgufWriter::new();
        w.add_tensor("w", &t, DType::F32);
        let mut bytes = Vec::new();
        w.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 16);
        std::fs::write(&path, &bytes).unwrap();

        let file = GgufFile::open(&path).unwrap();
        assert!(matches!(
            file.get_tensor_f32("w"),
            Err(ModelError::TruncatedTensor { .. })
        ));
    }

    #[test]
    fn test_overflowing_tensor_dims_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.gguf");

        // Zero bytes of data would pass the bounds check; the element
        // count of the shape is what overflows.
        let mut bytes = Vec::new();
        GgufHeader {
            version: GGUF_VERSION,
            n_tensors: 1,
            n_kv: 0,
        }
        .write(&mut bytes)
        .unwrap();
        GgufTensorInfo {
            name: "token_embd.weight".to_string(),
            dims: vec![1 << 33, 1 << 33, 0],
            dtype: DType::F32,
            offset: 0,
        }
        .write(&mut bytes)
        .unwrap();
        bytes.resize(align(bytes.len()) + 64, 0);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            GgufFile::open(&path),
            Err(ModelError::InvalidConfig(_))
        ));
    }
}
