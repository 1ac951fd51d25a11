/// Interleave two planar channel buffers into an LRLR device buffer. The
/// last step before samples reach the device.
pub fn interleave_stereo(out: &mut [f32], left: &[f32], right: &[f32]) {
    debug_assert_eq!(out.len(), left.len() + right.len());
    debug_assert_eq!(left.len(), right.len());

    for ((frame, l), r) in out.chunks_exact_mut(2).zip(left).zip(right) {
        frame[0] = *l;
        frame[1] = *r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave() {
        let left = [1.0, 2.0, 3.0];
        let right = [-1.0, -2.0, -3.0];
        let mut out = [0.0f32; 6];
        interleave_stereo(&mut out, &left, &right);
        assert_eq!(out, [1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_interleave_empty() {
        let mut out: [f32; 0] = [];
        interleave_stereo(&mut out, &[], &[]);
    }
}
