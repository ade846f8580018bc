/// Structural self-check of a model, run before it is trusted.
pub trait Verify {
    fn verify(&self) -> eyre::Result<()>;
}
