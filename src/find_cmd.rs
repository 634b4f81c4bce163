//! `agentc find`: search the tool or prompt catalog.

use anyhow::{bail, Result};

use agent_catalog_core::annotation::AnnotationPredicate;
use agent_catalog_core::catalog::{FindRequest, SearchResult};
use agent_catalog_core::models::CatalogKind;

use crate::config::Config;
use crate::provider::Provider;
use crate::secrets::SecretsProvider;

/// Flags of `agentc find`.
#[derive(Debug, Clone)]
pub struct FindArgs {
    pub query: Option<String>,
    pub name: Option<String>,
    pub kind: CatalogKind,
    pub limit: i64,
    pub annotations: Option<String>,
    pub snapshot: Option<String>,
    /// Force the closest-cluster refiner on.
    pub refine: bool,
    /// Search only the remote catalog.
    pub db: bool,
    /// Search only the local catalog.
    pub local: bool,
}

impl FindArgs {
    fn request(&self) -> Result<FindRequest> {
        let mut request = match (&self.name, &self.query) {
            (Some(name), _) => FindRequest::by_name(name),
            (None, Some(query)) => FindRequest::by_query(query),
            (None, None) => bail!("either a QUERY or --name must be given"),
        };
        request = request.with_limit(self.limit);
        if let Some(expr) = &self.annotations {
            request = request.with_annotations(AnnotationPredicate::parse(expr)?);
        }
        if let Some(snapshot) = &self.snapshot {
            request = request.with_snapshot(snapshot);
        }
        Ok(request)
    }
}

pub async fn run_find(config: &Config, secrets: &SecretsProvider, args: FindArgs) -> Result<()> {
    if args.db && args.local {
        bail!("--db and --local are mutually exclusive");
    }
    let request = args.request()?;

    let mut config = config.clone();
    if args.refine {
        config.refiner.enabled = true;
    }
    let provider = Provider::from_config(&config, secrets, !args.db, !args.local).await?;

    let results = provider.find(args.kind, &request).await?;
    print_results(&results);
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        let entry = &result.entry;
        println!("{}. [{:.3}] {}", i + 1, result.delta, entry.name);
        println!("    kind: {:?}", entry.record_kind());
        println!("    source: {}", entry.source.display());
        println!(
            "    description: \"{}\"",
            entry.description.replace('\n', " ").trim()
        );
        if let Some(annotations) = &entry.annotations {
            let pairs: Vec<String> = annotations
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            println!("    annotations: {}", pairs.join(" "));
        }
        println!("    id: {}", entry.identifier());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> FindArgs {
        FindArgs {
            query: None,
            name: None,
            kind: CatalogKind::Tool,
            limit: 3,
            annotations: None,
            snapshot: None,
            refine: false,
            db: false,
            local: false,
        }
    }

    #[test]
    fn name_wins_over_query() {
        let mut a = args();
        a.query = Some("book a flight".into());
        a.name = Some("find_flights".into());
        let request = a.request().unwrap();
        assert_eq!(request.name.as_deref(), Some("find_flights"));
        assert_eq!(request.limit, 3);
    }

    #[test]
    fn needs_a_query_or_name() {
        assert!(args().request().is_err());
    }

    #[test]
    fn annotations_are_parsed() {
        let mut a = args();
        a.query = Some("q".into());
        a.annotations = Some("gdpr = 'true'".into());
        assert!(a.request().is_err());

        a.annotations = Some("gdpr = \"true\"".into());
        assert!(a.request().unwrap().annotations.is_some());
    }
}
