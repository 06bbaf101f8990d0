//! Phase machine and allowlist tests.

use crate::error::{ErrorKind, OrchestrationError};
use crate::strategy::{
    ALWAYS_ALLOWED, CommandName, Phase, PhaseMachine, SessionMode, Strategy, StrategyError,
};
use rstest::rstest;

#[rstest]
#[case(Strategy::SIMPLE, &[Phase::Execute])]
#[case(Strategy::QUEUE, &[Phase::Pull, Phase::Claim, Phase::Execute, Phase::Report, Phase::Finish])]
#[case(Strategy::TREE, &[Phase::Analyze, Phase::Plan, Phase::Execute, Phase::Complete])]
#[case(
    Strategy::DAG,
    &[Phase::Analyze, Phase::Decompose, Phase::Spawn, Phase::Monitor, Phase::Verify, Phase::Complete]
)]
fn phases_are_declared_in_order(#[case] strategy: Strategy, #[case] expected: &[Phase]) {
    assert_eq!(strategy.phases(), expected);
    assert_eq!(expected.first().copied(), Some(strategy.initial_phase()));
}

#[rstest]
fn queue_worker_walks_pull_claim_execute_report() {
    let strategy = Strategy::QUEUE;
    let steps = [
        (Phase::Pull, CommandName::QueueTop, Phase::Claim),
        (Phase::Claim, CommandName::QueueStart, Phase::Execute),
        (Phase::Execute, CommandName::QueueComplete, Phase::Report),
        (Phase::Report, CommandName::QueueTop, Phase::Claim),
        (Phase::Claim, CommandName::QueueSkip, Phase::Pull),
        (Phase::Pull, CommandName::ReportComplete, Phase::Finish),
    ];

    for (from, command, to) in steps {
        assert_eq!(strategy.authorize(from, command), Ok(to), "{command} in {from}");
    }
}

#[rstest]
fn queue_commands_outside_their_phase_are_rejected() {
    let result = Strategy::QUEUE.authorize(Phase::Pull, CommandName::QueueComplete);

    let error = OrchestrationError::from(result.expect_err("complete needs a claim"));
    assert_eq!(error.kind(), ErrorKind::PermissionDenied);
}

#[rstest]
#[case(Strategy::SIMPLE)]
#[case(Strategy::QUEUE)]
#[case(Strategy::TREE)]
#[case(Strategy::DEFAULT)]
#[case(Strategy::BATCHING)]
#[case(Strategy::DAG)]
fn error_and_info_are_always_allowed(#[case] strategy: Strategy) {
    for phase in strategy.phases() {
        for command in ALWAYS_ALLOWED {
            assert_eq!(strategy.authorize(*phase, *command), Ok(*phase));
        }
    }
}

#[rstest]
#[case(Strategy::DEFAULT)]
#[case(Strategy::BATCHING)]
#[case(Strategy::DAG)]
fn coordinators_never_execute_directly(#[case] strategy: Strategy) {
    assert!(!strategy.command_set().contains(&CommandName::CodeExecute));
    for phase in strategy.phases() {
        assert!(matches!(
            strategy.authorize(*phase, CommandName::CodeExecute),
            Err(StrategyError::DirectExecutionForbidden { .. })
        ));
    }
}

#[rstest]
#[case(Strategy::SIMPLE)]
#[case(Strategy::QUEUE)]
#[case(Strategy::TREE)]
fn workers_never_delegate(#[case] strategy: Strategy) {
    assert_eq!(strategy.mode(), SessionMode::Execute);
    assert!(
        strategy
            .command_set()
            .iter()
            .all(|command| !command.is_delegation())
    );
}

#[rstest]
fn coordinator_moves_from_analysis_to_completion() {
    let strategy = Strategy::DEFAULT;
    let steps = [
        (Phase::Analyze, CommandName::TaskCreate, Phase::Decompose),
        (Phase::Decompose, CommandName::SessionSpawn, Phase::Spawn),
        (Phase::Spawn, CommandName::SessionWatch, Phase::Monitor),
        (Phase::Monitor, CommandName::TaskVerify, Phase::Verify),
        (Phase::Verify, CommandName::ReportComplete, Phase::Complete),
    ];

    for (from, command, to) in steps {
        assert_eq!(strategy.authorize(from, command), Ok(to), "{command} in {from}");
    }
    assert!(strategy.allowed_commands(Phase::Complete).is_empty());
}

#[rstest]
fn command_set_is_sorted_by_wire_name() {
    let names: Vec<&str> = Strategy::TREE
        .command_set()
        .into_iter()
        .map(CommandName::as_str)
        .collect();

    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert!(names.contains(&"tree:plan"));
}

#[rstest]
#[case("queue:start", Some(CommandName::QueueStart))]
#[case(" report:error ", Some(CommandName::ReportError))]
#[case("queue:explode", None)]
fn command_names_parse_from_the_wire(#[case] raw: &str, #[case] expected: Option<CommandName>) {
    assert_eq!(CommandName::try_from(raw).ok(), expected);
}
