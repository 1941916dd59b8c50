use crate::models::Location;

/// Per-payload state machine.
///
/// `Start → Inject → WaitSettle → Detect → Interact → AwaitWindow`, then the
/// same tail again under `SecondOrder` when a follow-up page is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    /// Load the first-order request with the payload substituted.
    Inject,
    /// Load the second-order page, which carries no payload.
    Revisit,
    WaitSettle(Location),
    Detect(Location),
    Interact(Location),
    AwaitWindow(Location),
    Done,
}

impl Stage {
    /// Following stage. `follow_up` says whether the second-order pass runs
    /// after the first-order window.
    pub fn next(self, follow_up: bool) -> Stage {
        match self {
            Stage::Start => Stage::Inject,
            Stage::Inject => Stage::WaitSettle(Location::FirstOrder),
            Stage::Revisit => Stage::WaitSettle(Location::SecondOrder),
            Stage::WaitSettle(loc) => Stage::Detect(loc),
            Stage::Detect(loc) => Stage::Interact(loc),
            Stage::Interact(loc) => Stage::AwaitWindow(loc),
            Stage::AwaitWindow(Location::FirstOrder) if follow_up => Stage::Revisit,
            Stage::AwaitWindow(_) | Stage::Done => Stage::Done,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Inject => "inject",
            Stage::Revisit => "revisit",
            Stage::WaitSettle(_) => "wait-settle",
            Stage::Detect(_) => "detect",
            Stage::Interact(_) => "interact",
            Stage::AwaitWindow(_) => "await-window",
            Stage::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(follow_up: bool) -> Vec<Stage> {
        let mut stages = vec![Stage::Start];
        let mut stage = Stage::Start;
        while stage != Stage::Done {
            stage = stage.next(follow_up);
            stages.push(stage);
        }
        stages
    }

    #[test]
    fn test_first_order_only() {
        assert_eq!(
            walk(false),
            vec![
                Stage::Start,
                Stage::Inject,
                Stage::WaitSettle(Location::FirstOrder),
                Stage::Detect(Location::FirstOrder),
                Stage::Interact(Location::FirstOrder),
                Stage::AwaitWindow(Location::FirstOrder),
                Stage::Done,
            ]
        );
    }

    #[test]
    fn test_second_order_tail() {
        let stages = walk(true);
        assert_eq!(stages.len(), 12);
        assert_eq!(stages[6], Stage::Revisit);
        assert_eq!(stages[10], Stage::AwaitWindow(Location::SecondOrder));
        assert_eq!(stages[11], Stage::Done);
    }
}
