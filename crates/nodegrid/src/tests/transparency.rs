//! Local and remote connections answer identically.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use crate::client::NodeClient;
use crate::context::ContextValue;
use crate::grid::Grid;
use crate::node::{CommandPayload, NodeOperation};
use crate::protocol::{MessageSession, Response};

use super::support::{CounterSession, ephemeral, recorded_grid, test_settings};

struct Hosted {
    grid: Grid,
    instance_id: String,
}

#[fixture]
fn hosted() -> Hosted {
    let (grid, _reporter) = recorded_grid(test_settings());
    let node = grid.create_node("n1").expect("create node");
    grid.expose_node("n1", "socket", &ephemeral()).expect("expose node");
    let instance_id = node
        .set("alpha", ContextValue::session(CounterSession::default()))
        .expect("instance id");
    Hosted { grid, instance_id }
}

fn clients(hosted: &Hosted) -> (NodeClient, NodeClient) {
    let descriptor = hosted
        .grid
        .lookup("n1")
        .expect("lookup")
        .expect("descriptor");
    let local = hosted
        .grid
        .connections()
        .create_connection(&descriptor)
        .expect("local connection");
    let remote = hosted
        .grid
        .connections()
        .with_local_allowed(false)
        .create_connection(&descriptor)
        .expect("remote connection");
    assert!(local.is_local());
    assert!(!remote.is_local());
    (
        NodeClient::with_session("n1", local, MessageSession::with_id("parity")),
        NodeClient::with_session("n1", remote, MessageSession::with_id("parity")),
    )
}

fn both(hosted: &Hosted, operation: &NodeOperation) -> (Response, Response) {
    let (mut local, mut remote) = clients(hosted);
    let local = local.request(operation).expect("local request");
    let remote = remote.request(operation).expect("remote request");
    (local, remote)
}

#[rstest]
#[case::lookup(NodeOperation::lookup_ksession("alpha"))]
#[case::lookup_id(NodeOperation::lookup_ksession_id("alpha"))]
#[case::lookup_miss(NodeOperation::lookup_ksession("nobody"))]
#[case::register(NodeOperation::register_ksession("beta", "iid-2"))]
#[case::echo(NodeOperation::execute(CommandPayload::new("echo", json!({"n": [1, 2]})), None))]
#[case::null_result(NodeOperation::execute(CommandPayload::new("echo", Value::Null), None))]
#[case::result_slot(NodeOperation::execute(CommandPayload::new("slot", Value::Null), None))]
#[case::command_failure(NodeOperation::execute(CommandPayload::new("fail", Value::Null), None))]
#[case::unknown_command(NodeOperation::execute(CommandPayload::new("rewind", Value::Null), None))]
fn responses_are_field_identical(hosted: Hosted, #[case] operation: NodeOperation) {
    let (local, remote) = both(&hosted, &operation);
    assert_eq!(local, remote);
    assert_eq!(local.session_id, "parity");
    assert_eq!(local.sequence, 1);
}

#[rstest]
fn session_commands_reach_the_same_state(hosted: Hosted) {
    let increment = NodeOperation::execute(
        CommandPayload::new("increment", Value::Null),
        Some(hosted.instance_id.clone()),
    );
    let (local, remote) = both(&hosted, &increment);

    assert_eq!(local.into_result(), Ok(Some(json!(1))));
    assert_eq!(remote.into_result(), Ok(Some(json!(2))));
}

#[rstest]
fn one_way_sends_complete_on_both_paths(hosted: Hosted) {
    let (mut local, mut remote) = clients(&hosted);
    local
        .send(&NodeOperation::register_ksession("gamma", "iid-3"))
        .expect("local send");
    remote
        .send(&NodeOperation::register_ksession("delta", "iid-4"))
        .expect("remote send");

    let node = hosted.grid.node("n1").expect("hosted node");
    assert_eq!(node.lookup_ksession("gamma").as_deref(), Some("iid-3"));
    assert!(super::support::wait_until(|| {
        node.lookup_ksession("delta").as_deref() == Some("iid-4")
    }));
}
