//! Text-generation capability used by the refinement loop.

/// A blocking text-completion service: one prompt in, one completion out.
///
/// Implementations do not retry. An `Err` or an empty completion ends the run
/// with [`GenerationFailed`](crate::error::DriverSynthError::GenerationFailed).
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;

    /// Short label used in logs and the run summary.
    fn name(&self) -> &str {
        "generator"
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
