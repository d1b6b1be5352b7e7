use std::sync::Arc;

use prost::Message;

use super::prompb::WriteRequest;
use crate::DecodeError;
use crate::Labels;
use crate::Sample;

/// Decodes a snappy-compressed (block format) protobuf `WriteRequest`.
pub fn decode_write_request(body: &[u8]) -> Result<WriteRequest, DecodeError> {
    let raw = snap::raw::Decoder::new().decompress_vec(body)?;
    Ok(WriteRequest::decode(raw.as_slice())?)
}

impl WriteRequest {
    /// Flattens every series into samples sharing that series' label map.
    pub fn into_samples(self) -> Vec<Sample> {
        let total = self.timeseries.iter().map(|ts| ts.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for ts in self.timeseries {
            let metric: Arc<Labels> = Arc::new(ts.labels.into_iter().map(|l| (l.name, l.value)).collect());
            for s in ts.samples {
                samples.push(Sample::new(metric.clone(), s.value, s.timestamp));
            }
        }
        samples
    }
}
