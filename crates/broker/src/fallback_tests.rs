use super::*;

#[tokio::test]
async fn no_op_controller_never_overrides() {
    let controller = NoOpFallbackController;
    let (mode, reason) = controller.resolve_mode("a1", CommMode::Headless).await;
    assert_eq!(mode, CommMode::Headless);
    assert!(reason.is_none());
}

struct DegradedToTmux;

#[async_trait::async_trait]
impl FallbackController for DegradedToTmux {
    async fn resolve_mode(&self, _agent_id: &str, _default_mode: CommMode) -> (CommMode, Option<String>) {
        (CommMode::Tmux, Some("compaction critical".to_owned()))
    }
}

#[tokio::test]
async fn a_custom_controller_can_override_with_a_reason() {
    let controller = DegradedToTmux;
    let (mode, reason) = controller.resolve_mode("a1", CommMode::Headless).await;
    assert_eq!(mode, CommMode::Tmux);
    assert_eq!(reason.as_deref(), Some("compaction critical"));
}
