/// Fused feature map layers the SSD512 model predicts from.
///
/// Each variant names the layer a prediction head attaches to, ordered from
/// the high-resolution stride-4 map down to the coarse stride-64 map. The
/// first four are produced by the top-down path: a stride-2 transposed
/// convolution of the next-deeper map summed with the matching bottom-up
/// feature map. `Conv9_2` is the deepest bottom-up map and is used as-is.
///
/// Small benthic animals occupy only a handful of pixels at 512×512, which
/// is why prediction starts at stride 4 rather than the stride 8 of the
/// original SSD512 layout.
#[repr(usize)]
#[derive(Debug, Clone, Copy)]
pub enum FusionLayers {
    /// `Deconv3_2` — conv3_3 fused with the upsampled stride-8 map.
    Deconv3_2,
    /// `Deconv4_2` — conv4_3 fused with the upsampled stride-16 map.
    Deconv4_2,
    /// `Deconv5_2` — conv7 (the converted fc7) fused with the upsampled stride-32 map.
    Deconv5_2,
    /// `Deconv6_2` — conv8_2 fused with the upsampled stride-64 map.
    Deconv6_2,
    /// `Conv9_2` — final bottom-up SSD feature extraction layer.
    Conv9_2,
}

impl FusionLayers {
    /// All prediction layers in the order their outputs are concatenated.
    pub fn as_list() -> Vec<FusionLayers> {
        vec![
            FusionLayers::Deconv3_2,
            FusionLayers::Deconv4_2,
            FusionLayers::Deconv5_2,
            FusionLayers::Deconv6_2,
            FusionLayers::Conv9_2,
        ]
    }

    /// Total number of layers carrying prediction heads.
    pub fn count() -> usize {
        Self::as_list().len()
    }

    /// 1-based numeric identifier, also the index into the anchor scale
    /// table (see `anchors::SCALES`).
    pub fn get_id(&self) -> usize {
        *self as usize + 1
    }

    /// Number of output channels (feature depth) for the layer.
    ///
    /// This determines the convolutional input size for both the classifier
    /// and bounding-box regression heads.
    pub fn output_size(&self) -> usize {
        match self {
            FusionLayers::Deconv3_2 => 256,
            FusionLayers::Deconv4_2 => 512,
            FusionLayers::Deconv5_2 => 1024,
            FusionLayers::Deconv6_2 => 512,
            FusionLayers::Conv9_2 => 256,
        }
    }

    /// Stride of the layer relative to the 512×512 input image.
    pub fn step(&self) -> usize {
        match self {
            FusionLayers::Deconv3_2 => 4,
            FusionLayers::Deconv4_2 => 8,
            FusionLayers::Deconv5_2 => 16,
            FusionLayers::Deconv6_2 => 32,
            FusionLayers::Conv9_2 => 64,
        }
    }

    /// Spatial size of the (square) feature map at 512×512 input.
    pub fn grid_size(&self) -> usize {
        crate::config::WIDTH / self.step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_list_order_and_contents() {
        let layers = FusionLayers::as_list();
        assert_eq!(layers.len(), 5);
        assert!(matches!(layers[0], FusionLayers::Deconv3_2));
        assert!(matches!(layers[1], FusionLayers::Deconv4_2));
        assert!(matches!(layers[2], FusionLayers::Deconv5_2));
        assert!(matches!(layers[3], FusionLayers::Deconv6_2));
        assert!(matches!(layers[4], FusionLayers::Conv9_2));
    }

    #[test]
    fn test_get_id_is_one_based() {
        for (index, layer) in FusionLayers::as_list().iter().enumerate() {
            assert_eq!(layer.get_id(), index + 1);
        }
    }

    #[test]
    fn test_output_size_values() {
        assert_eq!(FusionLayers::Deconv3_2.output_size(), 256);
        assert_eq!(FusionLayers::Deconv4_2.output_size(), 512);
        assert_eq!(FusionLayers::Deconv5_2.output_size(), 1024);
        assert_eq!(FusionLayers::Deconv6_2.output_size(), 512);
        assert_eq!(FusionLayers::Conv9_2.output_size(), 256);
    }

    #[test]
    fn test_grid_sizes_follow_steps() {
        let grids: Vec<usize> = FusionLayers::as_list()
            .iter()
            .map(|l| l.grid_size())
            .collect();
        assert_eq!(grids, vec![128, 64, 32, 16, 8]);
    }
}
