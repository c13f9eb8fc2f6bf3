//! Mechanical multiplier: stateless transforms that derive synthetic
//! "virtual" frame variants from a real base frame, so a percussive visual
//! effect can be layered onto an existing pose without a dedicated
//! generated asset.

use crate::frame::GeneratedFrame;

/// Extra zoom applied at full stutter intensity.
const ZOOM_SPAN: f32 = 0.18;
/// Upward display nudge, in pixels, at full stutter intensity.
const OFFSET_SPAN: f32 = 14.0;

/// Builds the stutter variant of `base`. The base frame is never mutated;
/// `intensity` is clamped to `[0, 1]` and scales the display hints.
pub fn stutter_variant(base: &GeneratedFrame, intensity: f32) -> GeneratedFrame {
    let intensity = intensity.clamp(0.0, 1.0);

    GeneratedFrame {
        pose: format!("{}_stutter", base.pose),
        is_virtual: true,
        mechanical_fx: Some("stutter".to_string()),
        virtual_zoom: Some(1.0 + ZOOM_SPAN * intensity),
        virtual_offset_y: Some(-OFFSET_SPAN * intensity),
        ..base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EnergyTier;

    fn base() -> GeneratedFrame {
        GeneratedFrame {
            url: "https://cdn.example/drop_01.png".to_string(),
            pose: "drop_01".to_string(),
            energy: EnergyTier::High,
            direction: "front".to_string(),
            kind: "dance".to_string(),
            role: Some("hero".to_string()),
            is_virtual: false,
            mechanical_fx: None,
            virtual_zoom: None,
            virtual_offset_y: None,
        }
    }

    #[test]
    fn stutter_variant_tags_and_suffix() {
        let frame = base();
        let variant = stutter_variant(&frame, 0.5);

        assert_eq!(variant.pose, format!("{}_stutter", frame.pose));
        assert_eq!(variant.mechanical_fx.as_deref(), Some("stutter"));
        assert!(variant.is_virtual);
        assert_eq!(variant.url, frame.url);
        assert_eq!(variant.role, frame.role);
    }

    #[test]
    fn intensity_scales_display_hints() {
        let frame = base();

        let soft = stutter_variant(&frame, 0.0);
        assert_eq!(soft.virtual_zoom, Some(1.0));
        assert_eq!(soft.virtual_offset_y, Some(0.0));

        let hard = stutter_variant(&frame, 1.0);
        assert!(hard.virtual_zoom.unwrap() > soft.virtual_zoom.unwrap());
        assert!(hard.virtual_offset_y.unwrap() < 0.0);

        // Out-of-range intensity clamps rather than amplifying.
        let clamped = stutter_variant(&frame, 7.0);
        assert_eq!(clamped.virtual_zoom, hard.virtual_zoom);
    }

    #[test]
    fn base_frame_is_untouched() {
        let frame = base();
        let before = frame.clone();
        let _ = stutter_variant(&frame, 0.9);
        assert_eq!(frame, before);
    }
}
