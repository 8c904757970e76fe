//! The per-scenario stages: deploy, validate and teardown.

use tracing::{info, warn};

use super::combined::combined_options;
use super::context::{Location, ScenarioContext};
use super::separate::separate_options;
use super::topology::ScenarioKind;
use super::vars::TFOUT_SERVER_INSTANCE_GROUP_NAME;
use super::{DEPLOY, TEARDOWN, VALIDATE};
use crate::cluster::{fetch_cluster_node_ip, ClusterValidator};
use crate::errors::Result;
use crate::stage::{run_with_teardown, TeardownRegistry};
use crate::state::StateStoreExt;

/// Provisions the scenario's clusters.
///
/// The resolved options are saved before `apply` so that teardown can find
/// them even when `apply` fails halfway.
pub async fn deploy(ctx: &ScenarioContext) -> Result<()> {
    let store = ctx.store();
    let location = Location::load(store, &ctx.suite_scope).await?;
    let image = ctx.image.resolve(store, &ctx.suite_scope).await?;

    let settings = &ctx.env.settings;
    let provisioner = &ctx.env.collaborators.provisioner;
    let module = settings.terraform_root.join(ctx.kind.module_subdir());
    let dir = provisioner.prepare_dir(&module, &ctx.module_dir()).await?;

    let options = match ctx.kind {
        ScenarioKind::Colocated => combined_options(dir, &location, &image, &ctx.topology)?,
        ScenarioKind::Separate => separate_options(dir, &location, &image, &ctx.topology)?,
    };
    store.save_options(&ctx.scope, &options).await?;

    info!(scenario = %ctx.label(), image = %image, dir = %options.dir.display(), "Applying infrastructure");
    provisioner.apply(&options).await?;
    Ok(())
}

/// Waits for the scenario's cluster to report exactly the expected members.
pub async fn validate(ctx: &ScenarioContext) -> Result<()> {
    let store = ctx.store();
    let options = store.load_options(&ctx.scope).await?;
    let location = Location::load(store, &ctx.suite_scope).await?;

    let collaborators = &ctx.env.collaborators;
    let group = collaborators
        .provisioner
        .output(&options, TFOUT_SERVER_INSTANCE_GROUP_NAME)
        .await?;

    let settings = &ctx.env.settings;
    let address = fetch_cluster_node_ip(
        collaborators.inventory.as_ref(),
        &ctx.poller,
        &settings.address_poll,
        &location.project,
        &location.region,
        &group,
    )
    .await?;
    info!(scenario = %ctx.label(), %group, %address, "Validating cluster");

    ClusterValidator::new(collaborators.status.clone())
        .with_poller(ctx.poller.clone())
        .with_retry(settings.cluster_poll.clone())
        .validate(
            &address,
            ctx.topology.server_count,
            ctx.topology.client_count,
        )
        .await
}

/// Destroys whatever the last deploy in this scope recorded.
pub async fn teardown(ctx: &ScenarioContext) -> Result<()> {
    let options = match ctx.store().load_options(&ctx.scope).await {
        Ok(options) => options,
        Err(e) => {
            warn!(scenario = %ctx.label(), scope = %ctx.scope, error = %e, "No saved provisioning options");
            return Err(e);
        }
    };
    ctx.env.collaborators.provisioner.destroy(&options).await
}

/// Runs one scenario: `deploy`, `validate`, and a guaranteed `teardown`.
///
/// Teardown is registered before deploy starts, so it runs whether deploy
/// or validate succeeds, fails or panics. A panic resumes once teardown
/// has run.
pub async fn run_scenario(ctx: &ScenarioContext) -> Result<()> {
    let registry = TeardownRegistry::new().with_sink(ctx.env.sink.clone());

    let teardown_ctx = ctx.clone();
    registry.register(TEARDOWN, move || async move {
        teardown_ctx
            .runner
            .run_stage(TEARDOWN, || teardown(&teardown_ctx))
            .await
            .map(|_| ())
    });

    run_with_teardown(&registry, async {
        ctx.runner.run_stage(DEPLOY, || deploy(ctx)).await?;
        ctx.runner.run_stage(VALIDATE, || validate(ctx)).await?;
        Ok(())
    })
    .await
}
