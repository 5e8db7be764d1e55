use compact_str::CompactString;
use crashmark_types::MarkerId;

/// Translates app-managed marker tokens back into text.
///
/// Called by the dump writer from its own thread, possibly while the render
/// thread is still recording. A miss is a normal outcome: the marker's slot
/// may have been recycled since the token was issued.
pub trait MarkerResolver: Send + Sync {
    fn resolve_marker(&self, id: MarkerId) -> Option<CompactString>;

    /// Resolve a raw pointer-sized token as handed back by the tracker.
    fn resolve_token(&self, token: u64) -> Option<CompactString> {
        let id = MarkerId::new(token).ok()?;
        self.resolve_marker(id)
    }
}
