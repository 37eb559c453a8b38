//! Frame type and pixel conversions.

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to grayscale by keeping the Y samples.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    let buf = yuyv.get(..expected).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })?;
    Ok(buf.iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits (keep the high byte).
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    let buf = y16.get(..expected).ok_or(FrameError::InvalidLength {
        expected,
        actual: y16.len(),
    })?;
    Ok(buf.chunks_exact(2).map(|px| px[1]).collect())
}

/// Copy the first `width * height` bytes of an 8-bit grayscale buffer.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize;
    grey.get(..expected)
        .map(<[u8]>::to_vec)
        .ok_or(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        })
}

/// True if more than `threshold_pct` of pixels are nearly black (< 32).
///
/// Covers lens-cap, covered-camera and sensor start-up frames.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_grayscale() {
        let yuyv: Vec<u8> = (0..16).collect();
        assert_eq!(yuyv_to_grayscale(&yuyv, 4, 2).unwrap(), vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_grayscale(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x12ff, 0x8001 little-endian
        let y16 = vec![0xff, 0x12, 0x01, 0x80];
        assert_eq!(y16_to_grayscale(&y16, 2, 1).unwrap(), vec![0x12, 0x80]);
        assert!(y16_to_grayscale(&y16, 3, 1).is_err());
    }

    #[test]
    fn test_grey_truncates_padding() {
        let grey = vec![1, 2, 3, 4, 99, 99];
        assert_eq!(grey_to_grayscale(&grey, 2, 2).unwrap(), vec![1, 2, 3, 4]);
        assert!(grey_to_grayscale(&grey, 3, 3).is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_large_dimensions_do_not_wrap() {
        // 65536 * 65536 * 2 wraps to 0 in u32.
        assert!(matches!(
            yuyv_to_grayscale(&[0; 4], 65_536, 65_536),
            Err(FrameError::InvalidLength { expected: 8_589_934_592, actual: 4 })
        ));
        assert!(grey_to_grayscale(&[0; 4], 65_536, 65_536).is_err());
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(is_dark_frame(&[], 0.95));
        assert!(is_dark_frame(&vec![0u8; 1000], 0.95));
        assert!(!is_dark_frame(&vec![128u8; 1000], 0.95));

        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&mostly_dark, 0.95));

        let mut borderline = vec![10u8; 940];
        borderline.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&borderline, 0.95));
    }
}
