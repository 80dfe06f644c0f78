use log::debug;

use crate::drivers::source::VoltageRange;
use crate::drivers::StreamError;

/// Lowest raw code of the 24-bit signed converter.
pub const CODE_MIN: i64 = -(1 << 23);
/// One past the highest raw code.
pub const CODE_MAX: i64 = 1 << 23;

/// Straight line through (X1, Ymin) and (X2, Ymax):
///
/// ```text
/// y     = x*scale + offset
/// scale = (Ymax - Ymin) / (X2 - X1)
/// offset = Ymin - X1*scale
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelCalibration {
    pub scale: f64,
    pub offset: f64,
}
impl ChannelCalibration {
    pub fn from_range(range: VoltageRange) -> Self {
        let scale = (range.vmax - range.vmin) / (CODE_MAX - CODE_MIN) as f64;
        let offset = range.vmin - CODE_MIN as f64 * scale;
        Self { scale, offset }
    }
    #[inline]
    pub fn volts(&self, code: i32) -> f64 {
        self.scale * code as f64 + self.offset
    }
    /// Nearest raw code for `volts`, saturated to the converter span.
    pub fn code(&self, volts: f64) -> i32 {
        let code = ((volts - self.offset) / self.scale).round();
        code.clamp(CODE_MIN as f64, (CODE_MAX - 1) as f64) as i32
    }
}
/// Per-channel calibration, computed once before streaming starts.
#[derive(Clone, Debug)]
pub struct CalibrationTable {
    channels: Vec<ChannelCalibration>,
}
impl CalibrationTable {
    pub fn compute(ranges: &[VoltageRange], nchan: usize) -> Result<Self, StreamError> {
        if ranges.len() != nchan {
            return Err(StreamError::ChannelMismatch {
                expected: nchan,
                actual: ranges.len(),
            });
        }
        let mut channels = Vec::with_capacity(nchan);
        for (idx, range) in ranges.iter().enumerate() {
            if !range.vmin.is_finite() || !range.vmax.is_finite() || range.vmax <= range.vmin {
                return Err(StreamError::InvalidRange {
                    channel: idx,
                    vmin: range.vmin,
                    vmax: range.vmax,
                });
            }
            let cal = ChannelCalibration::from_range(*range);
            debug!(
                "[{idx:2}] vmin:{:.2} vmax:{:.2} span:{:x} scale:{:.5e} offset:{:.5}",
                range.vmin,
                range.vmax,
                CODE_MAX - CODE_MIN,
                cal.scale,
                cal.offset
            );
            channels.push(cal);
        }
        Ok(Self { channels })
    }
    pub fn len(&self) -> usize {
        self.channels.len()
    }
    pub fn channel(&self, channel: usize) -> ChannelCalibration {
        self.channels[channel]
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn endpoints_map_to_range_limits() {
        let cal = ChannelCalibration::from_range(VoltageRange::new(-2.5, 7.5));
        let at_min = cal.scale * CODE_MIN as f64 + cal.offset;
        let at_max = cal.scale * CODE_MAX as f64 + cal.offset;
        assert!((at_min - -2.5).abs() < 1e-9);
        assert!((at_max - 7.5).abs() < 1e-9);
    }
    #[test]
    fn symmetric_range_maps_zero_code_to_zero_volts() {
        let cal = ChannelCalibration::from_range(VoltageRange::new(-5.0, 5.0));
        assert!(cal.volts(0).abs() < 1e-12);
        assert!((cal.scale - 10.0 / 16_777_216.0).abs() < 1e-18);
    }
    #[test]
    fn code_inverts_volts_and_saturates() {
        let cal = ChannelCalibration::from_range(VoltageRange::new(-10.0, 10.0));
        assert_eq!(cal.code(cal.volts(12345)), 12345);
        assert_eq!(cal.code(50.0), (CODE_MAX - 1) as i32);
        assert_eq!(cal.code(-50.0), CODE_MIN as i32);
    }
    #[test]
    fn channel_count_mismatch_fails() {
        let ranges = vec![VoltageRange::new(-1.0, 1.0); 3];
        let err = CalibrationTable::compute(&ranges, 4).unwrap_err();
        assert!(matches!(
            err,
            StreamError::ChannelMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }
    #[test]
    fn inverted_range_fails() {
        let ranges = vec![VoltageRange::new(-1.0, 1.0), VoltageRange::new(2.0, 2.0)];
        let err = CalibrationTable::compute(&ranges, 2).unwrap_err();
        assert!(matches!(err, StreamError::InvalidRange { channel: 1, .. }));
    }
    #[test]
    fn table_keeps_channel_order() {
        let ranges = vec![VoltageRange::new(-1.0, 1.0), VoltageRange::new(0.0, 10.0)];
        let table = CalibrationTable::compute(&ranges, 2).unwrap();
        assert_eq!(table.len(), 2);
        assert!((table.channel(1).volts(CODE_MIN as i32) - 0.0).abs() < 1e-9);
    }
}
