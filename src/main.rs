use std::{f64::consts::TAU, fs, path::PathBuf, sync::Arc, time::Instant};

use anyhow::{bail, Context};
use clap::Parser;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use radial_plan::demand::{load_options, select_option};
use radial_plan::finder::{MassFinder, MassJob};
use radial_plan::params::{Params, DEFAULT_PARAMS};
use radial_plan::polar_sector::Point;
use radial_plan::site::{Disc, ObstacleKind, Site, SiteSpec};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Radial mass and room layout search.")]
pub struct Args {
    /// Site description (boundary, obstacles, masses) as JSON
    #[arg(short, long)]
    pub site: PathBuf,

    /// Demand options per mass, in the order the site lists its masses
    #[arg(short, long, required = true)]
    pub demand: Vec<PathBuf>,

    /// Which demand option to use for every mass
    #[arg(short, long, default_value_t = 0)]
    pub option: usize,

    /// Partial parameter overrides as JSON
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// Worker threads (defaults to physical cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Scatter this many random disc obstacles around the masses
    #[arg(long, default_value_t = 0)]
    pub scatter: usize,

    /// Seed for --scatter
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

fn load_params(path: Option<&PathBuf>) -> anyhow::Result<Params> {
    let Some(path) = path else {
        return Ok(*DEFAULT_PARAMS);
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing params {}", path.display()))
}

/// Random small discs within 40 units of the mass centers.
fn scatter(mut site: Site, centers: &[Point], n: usize, seed: u64) -> anyhow::Result<Site> {
    let mut rng = SmallRng::seed_from_u64(seed);
    for _ in 0..n {
        let c = centers[rng.gen_range(0..centers.len())];
        let (angle, dist) = (rng.gen_range(0.0..TAU), rng.gen_range(8.0..40.0));
        let at = Point::new(c.x + dist * angle.cos(), c.y + dist * angle.sin());
        let disc = Disc::new(at, rng.gen_range(1.0..3.0))?;
        log::debug!("scattered obstacle at ({:.1}, {:.1}) r={:.1}", at.x, at.y, disc.radius);
        site = site.with_obstacle(ObstacleKind::Other("scatter".to_string()), Box::new(disc));
    }
    Ok(site)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    log::set_max_level(log::LevelFilter::Trace);
    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .init();

    let start = Instant::now();
    let mut params = load_params(args.params.as_ref())?;
    if let Some(n) = args.threads {
        params.n_threads = n.max(1);
    }
    log::info!("{}", params);

    let text = fs::read_to_string(&args.site)
        .with_context(|| format!("reading site {}", args.site.display()))?;
    let spec: SiteSpec = serde_json::from_str(&text)
        .with_context(|| format!("parsing site {}", args.site.display()))?;
    if spec.masses.is_empty() {
        bail!("site {} defines no masses", args.site.display());
    }
    if spec.masses.len() != args.demand.len() {
        bail!(
            "{} masses but {} demand files",
            spec.masses.len(),
            args.demand.len()
        );
    }

    let mut site = spec.build()?;
    if args.scatter > 0 {
        let centers = spec.masses.iter().map(|m| m.center).collect::<Vec<_>>();
        site = scatter(site, &centers, args.scatter, args.seed)?;
    }

    let mut jobs = Vec::with_capacity(spec.masses.len());
    for (mass, path) in spec.masses.iter().zip(args.demand.iter()) {
        let options = load_options(path)?;
        let clusters = select_option(options, args.option)
            .with_context(|| format!("demand for mass {}", mass.name))?;
        jobs.push(MassJob {
            name: mass.name.clone(),
            target_area: mass.target_area,
            center: mass.center,
            center_radius: mass.center_radius,
            clusters,
        });
    }
    log::info!("Placing {} masses on {}", jobs.len(), args.site.display());

    let finder = MassFinder::new(Arc::new(site), &params);
    for report in finder.run(jobs) {
        println!("{}", serde_json::to_string(&report)?);
    }
    log::info!("Total runtime: {:.3?}", start.elapsed());
    Ok(())
}
