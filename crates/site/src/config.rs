//! Site configuration: which resources the marketing site warms up and how
//! its page sections are tiered.

use std::path::Path;

use anyhow::{Context, Result};
use datawise_preload::{
    CriticalResourcePlan, CrossOrigin, FetchPriority, PreloadOptions, PreloaderConfig,
    ResourceSpec, RouteResources, StagedPreloadPlan, ThirdPartyPlan,
};
use datawise_progressive::{Priority, SchedulerConfig, Skeleton};
use serde::{Deserialize, Serialize};

pub const BASE_URL: &str = "https://datawise.bet";

const SPORTSBOOKS: [&str; 13] = [
    "fanduel",
    "draftkings",
    "caesars",
    "betmgm",
    "espn",
    "bovada",
    "prizepicks",
    "underdog",
    "betonline",
    "circa",
    "betr",
    "fliff",
    "hardrock",
];

/// One page section rendered as a loadable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpec {
    pub id: String,
    #[serde(default)]
    pub priority: Priority,
    /// Laid-out height in pixels
    pub height: f64,
    /// Time the section's content takes to arrive
    #[serde(default)]
    pub load_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<Skeleton>,
    /// Make the section's loader reject
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fail: bool,
}

impl SectionSpec {
    pub fn new(id: &str, priority: Priority, height: f64) -> Self {
        Self {
            id: id.to_string(),
            priority,
            height,
            load_ms: 50,
            min_height: None,
            skeleton: None,
            fail: false,
        }
    }

    fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }
}

/// Everything a site session needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SitePreloadConfig {
    pub preloader: PreloaderConfig,
    pub enable_route_preloading: bool,
    pub routes: RouteResources,
    pub critical: CriticalResourcePlan,
    /// Origins that get a DNS prefetch on startup
    pub critical_domains: Vec<String>,
    /// Origins that get a full preconnect on startup
    pub preconnect_domains: Vec<String>,
    /// Extra origins appended to the DNS prefetch list
    pub custom_domains: Vec<String>,
    pub logos: StagedPreloadPlan,
    pub third_party: ThirdPartyPlan,
    pub scheduler: SchedulerConfig,
    pub sections: Vec<SectionSpec>,
    /// Hrefs whose hint elements error instead of loading
    pub simulated_failures: Vec<String>,
    /// Time between issuing hints and the simulated network settling them
    pub network_latency_ms: u64,
}

impl Default for SitePreloadConfig {
    fn default() -> Self {
        Self {
            preloader: PreloaderConfig::with_base_url(BASE_URL),
            enable_route_preloading: true,
            routes: default_routes(),
            critical: default_critical_plan(),
            critical_domains: [
                "https://fonts.googleapis.com",
                "https://fonts.gstatic.com",
                "https://www.googletagmanager.com",
                "https://analytics.google.com",
                "https://identity.netlify.com",
                "https://cdn.gpteng.co",
            ]
            .map(String::from)
            .to_vec(),
            preconnect_domains: ["https://fonts.gstatic.com", "https://www.googletagmanager.com"]
                .map(String::from)
                .to_vec(),
            custom_domains: Vec::new(),
            logos: StagedPreloadPlan::new(
                SPORTSBOOKS
                    .iter()
                    .map(|book| format!("/sportsbook-logos/{}.webp", book))
                    .collect(),
            ),
            third_party: ThirdPartyPlan {
                enabled: true,
                scripts: vec![
                    "https://www.googletagmanager.com/gtag/js?id=G-9DJ3SPJRC7".to_string(),
                    "https://identity.netlify.com/v1/netlify-identity-widget.js".to_string(),
                ],
                preconnect: vec![
                    "https://www.google-analytics.com".to_string(),
                    "https://analytics.google.com".to_string(),
                ],
            },
            scheduler: SchedulerConfig::default(),
            sections: default_sections(),
            simulated_failures: Vec::new(),
            network_latency_ms: 120,
        }
    }
}

impl SitePreloadConfig {
    /// Parse a JSON document; omitted fields keep the site defaults
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid site configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// DNS prefetch targets: the critical domains followed by the custom ones
    pub fn dns_prefetch_domains(&self) -> impl Iterator<Item = &str> {
        self.critical_domains
            .iter()
            .chain(&self.custom_domains)
            .map(String::as_str)
    }
}

fn image(mime_type: &str, priority: FetchPriority) -> PreloadOptions {
    PreloadOptions::image()
        .with_type(mime_type)
        .with_fetch_priority(priority)
}

fn default_routes() -> RouteResources {
    RouteResources::new()
        .with_route(
            "/",
            vec![
                ResourceSpec::new(
                    "/lovable-uploads/HeroImage.webp",
                    image("image/webp", FetchPriority::High),
                ),
                ResourceSpec::new(
                    "/lovable-uploads/HeroImage-400.png",
                    image("image/png", FetchPriority::High),
                ),
                ResourceSpec::new(
                    "/lovable-uploads/DatawiseLogo.webp",
                    image("image/webp", FetchPriority::High),
                ),
            ],
        )
        .with_route(
            "/blog",
            vec![ResourceSpec::new(
                "/lovable-uploads/blog_post_luck_in_betting.webp",
                image("image/webp", FetchPriority::Low),
            )],
        )
        .with_route(
            "/betting-simulator",
            vec![ResourceSpec::new(
                "/lovable-uploads/feature_positive_ev_betting.webp",
                image("image/webp", FetchPriority::Low),
            )],
        )
}

fn default_critical_plan() -> CriticalResourcePlan {
    CriticalResourcePlan {
        hero_mobile: Some(ResourceSpec::new(
            "/lovable-uploads/HeroImage-400.png",
            image("image/png", FetchPriority::High),
        )),
        hero_desktop: Some(ResourceSpec::new(
            "/lovable-uploads/HeroImage.webp",
            image("image/webp", FetchPriority::High),
        )),
        always: vec![ResourceSpec::new(
            "/lovable-uploads/DatawiseLogo.webp",
            image("image/webp", FetchPriority::High),
        )],
        dns_prefetch: vec![
            "https://fonts.googleapis.com".to_string(),
            "https://fonts.gstatic.com".to_string(),
            "https://www.googletagmanager.com".to_string(),
        ],
        preconnect: vec![
            "https://fonts.googleapis.com".to_string(),
            "https://fonts.gstatic.com".to_string(),
        ],
        preconnect_cross_origin: Some(CrossOrigin::Anonymous),
        ..CriticalResourcePlan::default()
    }
}

/// Landing page sections, top to bottom
fn default_sections() -> Vec<SectionSpec> {
    vec![
        SectionSpec::new("hero", Priority::Critical, 720.0),
        SectionSpec::new("logo-carousel", Priority::High, 160.0).with_skeleton(Skeleton::Card {
            height: "160px".to_string(),
        }),
        SectionSpec::new("features", Priority::High, 900.0),
        SectionSpec::new("how-it-works", Priority::Medium, 800.0),
        SectionSpec::new("testimonials", Priority::Medium, 600.0)
            .with_skeleton(Skeleton::Text { lines: 6 }),
        SectionSpec::new("pricing", Priority::Low, 900.0),
        SectionSpec::new("faq", Priority::Low, 700.0).with_skeleton(Skeleton::Text { lines: 8 }),
        SectionSpec::new("cta", Priority::Deferred, 400.0),
        SectionSpec::new("footer", Priority::Deferred, 300.0),
    ]
}
