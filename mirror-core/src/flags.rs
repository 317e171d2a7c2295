use bitflags::bitflags;

bitflags! {
    /// Per-fragment flag byte carried in the fragment header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FragmentFlags: u8 {
        /// The frame this fragment belongs to is independently decodable.
        const KEYFRAME = 0b0000_0001;
    }
}

impl FragmentFlags {
    pub fn keyframe(is_keyframe: bool) -> Self {
        if is_keyframe {
            Self::KEYFRAME
        } else {
            Self::empty()
        }
    }

    pub fn is_keyframe(self) -> bool {
        self.contains(Self::KEYFRAME)
    }
}
