use simulation::{simulate, simulate_scaling};
use tracing_subscriber::EnvFilter;
pub mod simulation;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            TREEDOC REPLICATION SIMULATION                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;

    // Run 1: a few replicas, default node size
    let stats = simulate(3, 200, 65535).await;
    stats.print();
    converged &= stats.converged;

    // Run 2: same load with tiny nodes to force deep branching
    let stats = simulate(3, 200, 4).await;
    stats.print();
    converged &= stats.converged;

    // Run 3: more replicas
    let stats = simulate(8, 250, 256).await;
    stats.print();
    converged &= stats.converged;

    // Run 4: scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    converged &= simulate_scaling(12, 4).await;

    if converged {
        println!("\n✓ All replicas converged!");
    } else {
        eprintln!("\n✗ Some replicas diverged");
        std::process::exit(1);
    }
}
