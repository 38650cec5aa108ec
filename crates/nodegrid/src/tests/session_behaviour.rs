//! Behavioural tests for the session lifecycle on a grid-hosted node.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::capability::Capability;
use crate::client::NodeClient;
use crate::context::ContextValue;
use crate::grid::Grid;
use crate::node::ExecutionNode;

use super::support::{CounterSession, HealthEvent, RecordingHealthReporter, recorded_grid, test_settings, wait_until};

type StepResult = Result<(), String>;

const SHORT_TTL: Duration = Duration::from_millis(50);

struct SessionWorld {
    grid: Option<Grid>,
    reporter: Option<Arc<RecordingHealthReporter>>,
    node: Option<Arc<ExecutionNode>>,
    client: Option<NodeClient>,
    session: Option<ContextValue>,
    instance_id: Option<String>,
}

impl SessionWorld {
    fn new() -> Self {
        Self {
            grid: None,
            reporter: None,
            node: None,
            client: None,
            session: None,
            instance_id: None,
        }
    }

    fn grid(&self) -> Result<&Grid, String> {
        self.grid.as_ref().ok_or_else(|| String::from("grid not built"))
    }

    fn node(&self) -> Result<&Arc<ExecutionNode>, String> {
        self.node.as_ref().ok_or_else(|| String::from("node not created"))
    }

    fn instance_id(&self) -> Result<String, String> {
        self.instance_id
            .clone()
            .ok_or_else(|| String::from("no instance id minted"))
    }
}

#[fixture]
fn world() -> RefCell<SessionWorld> {
    RefCell::new(SessionWorld::new())
}

#[given("a grid with a short eviction TTL")]
fn given_grid(world: &RefCell<SessionWorld>) {
    let mut settings = test_settings();
    settings.eviction_ttl = SHORT_TTL;
    settings.eviction_interval = Duration::from_millis(10);
    let (grid, reporter) = recorded_grid(settings);
    let mut world = world.borrow_mut();
    world.grid = Some(grid);
    world.reporter = Some(reporter);
}

#[when("node {id} is created")]
fn when_node_created(world: &RefCell<SessionWorld>, id: String) -> StepResult {
    let node = world
        .borrow()
        .grid()?
        .create_node(&id)
        .map_err(|error| error.to_string())?;
    world.borrow_mut().node = Some(node);
    Ok(())
}

#[then("the directory describes {id} as an execution node")]
fn then_directory_describes(world: &RefCell<SessionWorld>, id: String) -> StepResult {
    let world = world.borrow();
    let descriptor = world
        .grid()?
        .lookup(&id)
        .map_err(|error| error.to_string())?
        .ok_or_else(|| format!("no descriptor for {id}"))?;
    assert_eq!(descriptor.id, id);
    assert_eq!(descriptor.service_interface, Capability::EXECUTION_NODE);

    let events = world.reporter.as_ref().map(|reporter| reporter.events()).unwrap_or_default();
    assert!(
        events.contains(&HealthEvent::NodeCreated(id)),
        "node creation was not reported: {events:?}"
    );
    Ok(())
}

#[when("a counter session is bound to {key}")]
fn when_session_bound(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let session = ContextValue::session(CounterSession::default());
    let instance_id = world.borrow().node()?.set(&key, session.clone());
    let mut world = world.borrow_mut();
    world.instance_id = instance_id;
    world.session = Some(session);
    Ok(())
}

#[then("{key} and its instance id resolve to the same session")]
fn then_dual_addressing(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let world = world.borrow();
    let node = world.node()?;
    let instance_id = world.instance_id()?;
    assert!(!instance_id.is_empty(), "instance id must not be empty");
    assert_eq!(node.get(&key, &Capability::ANY), world.session);
    assert_eq!(node.get(&instance_id, &Capability::SESSION), world.session);
    Ok(())
}

#[when("{key} is registered against its instance id through a client")]
fn when_registered(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let instance_id = world.borrow().instance_id()?;
    let mut client = world
        .borrow()
        .grid()?
        .client("n1")
        .map_err(|error| error.to_string())?;
    client
        .register_ksession(&key, &instance_id)
        .map_err(|error| error.to_string())?;
    world.borrow_mut().client = Some(client);
    Ok(())
}

#[then("looking up {key} through the client yields the instance id")]
fn then_lookup_yields(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let mut world = world.borrow_mut();
    let expected = world.instance_id()?;
    let client = world
        .client
        .as_mut()
        .ok_or_else(|| String::from("client not opened"))?;
    let found = client.lookup_ksession(&key).map_err(|error| error.to_string())?;
    assert_eq!(found, Some(expected));
    Ok(())
}

#[then("looking up {key} through the client yields nothing")]
fn then_lookup_yields_nothing(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let mut world = world.borrow_mut();
    let client = world
        .client
        .as_mut()
        .ok_or_else(|| String::from("client not opened"))?;
    let found = client.lookup_ksession(&key).map_err(|error| error.to_string())?;
    assert_eq!(found, None);
    Ok(())
}

#[when("a counter session is bound temporarily to {key}")]
fn when_bound_temporarily(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    world
        .borrow()
        .node()?
        .set_temporary(&key, ContextValue::session(CounterSession::default()));
    Ok(())
}

#[when("the eviction TTL elapses without touching {key}")]
fn when_ttl_elapses(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let world = world.borrow();
    let node = world.node()?;
    if wait_until(|| node.get(&key, &Capability::ANY).is_none()) {
        Ok(())
    } else {
        Err(format!("{key} was not evicted"))
    }
}

#[then("{key} is not found")]
fn then_not_found(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let world = world.borrow();
    assert_eq!(world.node()?.get(&key, &Capability::ANY), None);
    Ok(())
}

#[then("{key} still resolves to the same session")]
fn then_still_resolves(world: &RefCell<SessionWorld>, key: String) -> StepResult {
    let world = world.borrow();
    assert!(world.session.is_some());
    assert_eq!(world.node()?.get(&key, &Capability::ANY), world.session);
    Ok(())
}

#[scenario(path = "tests/features/session_lifecycle.feature")]
fn session_lifecycle(#[from(world)] world: RefCell<SessionWorld>) {
    drop(world);
}
