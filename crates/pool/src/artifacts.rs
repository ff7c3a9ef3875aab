use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use termfleet_core::{BrokerCredentials, FleetConfig, SlotId};

/// Render the terminal configuration artifact the workload reads at its
/// fixed in-container path.
pub fn render_terminal_config(
    credentials: &BrokerCredentials,
    symbol: &str,
    timeframe: &str,
) -> String {
    format!(
        "[Common]\nLogin={}\nPassword={}\nServer={}\n\n[Trading]\nSymbol={}\nTimeFrame={}\n",
        credentials.login, credentials.password, credentials.server, symbol, timeframe
    )
}

/// Render the per-slot deployment descriptor: one named service, the
/// terminal image, a bind mount for the configuration artifact, a restart
/// policy, and membership in the shared fleet network.
pub fn render_compose(config: &FleetConfig, slot: SlotId) -> String {
    let name = config.container_name(slot);
    format!(
        "services:\n  {name}:\n    container_name: {name}\n    image: {image}\n    restart: unless-stopped\n    volumes:\n      - {config_path}:{target}:ro\n    networks:\n      - {network}\n\nnetworks:\n  {network}:\n    external: true\n",
        name = name,
        image = config.image,
        config_path = format!("{}/terminal.ini", config.slot_dir(slot)),
        target = config.container_config_path,
        network = config.network,
    )
}

/// Single-quote a value for embedding in a remote shell command.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the command that writes `content` to `path` on the fleet host.
///
/// The content travels as an opaque base64 blob decoded server-side, so
/// secrets and newlines never hit shell quoting.
pub fn write_file_command(path: &str, content: &str) -> String {
    format!(
        "printf '%s' {} | base64 -d > {}",
        BASE64.encode(content),
        sh_quote(path)
    )
}

/// One command staging the whole per-slot descriptor directory.
pub fn stage_command(config: &FleetConfig, slot: SlotId, terminal_ini: &str, compose: &str) -> String {
    let dir = config.slot_dir(slot);
    format!(
        "mkdir -p {dir} && {ini} && {compose}",
        dir = sh_quote(&dir),
        ini = write_file_command(&format!("{dir}/terminal.ini"), terminal_ini),
        compose = write_file_command(&format!("{dir}/docker-compose.yml"), compose),
    )
}

/// Create the shared fleet network if it does not exist yet.
pub fn ensure_network_command(config: &FleetConfig) -> String {
    let net = sh_quote(&config.network);
    format!("docker network inspect {net} >/dev/null 2>&1 || docker network create {net}")
}

/// Start the workload for a slot.
pub fn start_command(config: &FleetConfig, slot: SlotId) -> String {
    format!(
        "docker compose -f {} up -d",
        sh_quote(&format!("{}/docker-compose.yml", config.slot_dir(slot)))
    )
}

/// Stop and remove the workload. Must not fail when the deployment is
/// already stopped or absent.
pub fn stop_command(config: &FleetConfig, slot: SlotId) -> String {
    format!(
        "docker compose -f {} down --remove-orphans 2>/dev/null || docker rm -f {} 2>/dev/null || true",
        sh_quote(&format!("{}/docker-compose.yml", config.slot_dir(slot))),
        sh_quote(&config.container_name(slot)),
    )
}

/// Delete the per-slot descriptor directory.
pub fn cleanup_command(config: &FleetConfig, slot: SlotId) -> String {
    format!("rm -rf {}", sh_quote(&config.slot_dir(slot)))
}

/// Remove the shared network. Only issued when no occupied slot remains.
pub fn remove_network_command(config: &FleetConfig) -> String {
    format!(
        "docker network rm {} 2>/dev/null || true",
        sh_quote(&config.network)
    )
}

/// List live terminal containers by the slot naming convention.
pub fn list_command(config: &FleetConfig) -> String {
    format!(
        "docker ps --filter {} --format '{{{{.Names}}}}'",
        sh_quote(&format!("name={}-", config.container_prefix))
    )
}

/// Force-remove a single container by name (reconciliation of orphans).
pub fn remove_container_command(name: &str) -> String {
    format!("docker rm -f {} 2>/dev/null || true", sh_quote(name))
}
