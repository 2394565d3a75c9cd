/// Opaque identifier of a reference frame.
///
/// The geometry core never interprets frames, it only checks that the tokens
/// supplied by the trajectory layer are consistent with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(&'static str);

impl FrameId {
    pub const GCRF: FrameId = FrameId::new("GCRF");
    pub const ITRF: FrameId = FrameId::new("ITRF");

    pub const fn new(name: &'static str) -> Self {
        FrameId(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}
