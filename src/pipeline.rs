//! Batch orchestration
//!
//! Runs a batch of inputs through the stages in order, each stage fanning out
//! one task per item and joining them all before the next stage starts:
//!
//! 1. Expand: ZIP archives are unpacked in place, other inputs pass through
//! 2. Filter: only `.xml` and `.xsl` files are kept
//! 3. Parse: every kept file is parsed
//! 4. Register: parsed files are indexed by basename
//! 5. Resolve: each `.xml` document's stylesheet references are looked up
//! 6. Transform: each `.xml` document is transformed and serialized
//!
//! Results keep the order of the filtered inputs, whatever order the tasks
//! finish in.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::files::{InputFile, RawFile, is_candidate, is_document};
use crate::registry::{ParsedDocument, Registry, StylesheetAssociation};
use crate::xml::{Document, to_markup};
use crate::xslt::{Transformer, Xslt, with_transform_stack};
use crate::zip::ZipExtractor;

/// What happens when one file of the batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failure aborts the whole batch.
    #[default]
    FailFast,
    /// Every document reports its own outcome.
    Isolate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    /// Raise [`Error::ArchiveFormat`] on malformed archives instead of
    /// ending the scan early.
    pub strict_archive: bool,
}

/// Serialized output of one `.xml` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub name: String,
    pub markup: String,
}

/// Per-file result in isolated mode.
#[derive(Debug)]
pub struct FileOutcome {
    pub name: String,
    pub result: Result<String>,
}

impl From<TransformResult> for FileOutcome {
    fn from(result: TransformResult) -> Self {
        Self {
            name: result.name,
            result: Ok(result.markup),
        }
    }
}

/// A file after expansion and filtering. Failed files keep their slot.
type Slot<T> = (String, Result<T>);

pub struct Pipeline<T = Xslt> {
    config: PipelineConfig,
    transformer: T,
}

impl Pipeline<Xslt> {
    /// Pipeline using the built-in XSLT engine.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_transformer(config, Xslt)
    }
}

impl<T: Transformer> Pipeline<T> {
    pub fn with_transformer(config: PipelineConfig, transformer: T) -> Self {
        Self {
            config,
            transformer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the batch under the configured failure policy.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Named inputs; archives are recognized by media type
    ///
    /// # Returns
    ///
    /// One outcome per `.xml` document in input order. In isolated mode
    /// failed files are reported in their position; in fail-fast mode the
    /// first failure is returned as the error and every outcome succeeded.
    pub async fn process(&self, inputs: Vec<InputFile>) -> Result<Vec<FileOutcome>> {
        match self.config.failure_policy {
            FailurePolicy::FailFast => Ok(self
                .run(inputs)
                .await?
                .into_iter()
                .map(FileOutcome::from)
                .collect()),
            FailurePolicy::Isolate => Ok(self.run_isolated(inputs).await),
        }
    }

    /// Run the batch, aborting on the first failure.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Named inputs; archives are recognized by media type
    ///
    /// # Returns
    ///
    /// The transformed documents in filtered input order, or the first error
    /// any stage hit. No partial results are returned.
    pub async fn run(&self, inputs: Vec<InputFile>) -> Result<Vec<TransformResult>> {
        let strict = self.config.strict_archive;
        let expanded = try_join_all(inputs.into_iter().map(|input| async move {
            if !input.is_archive() {
                return Ok(vec![RawFile::from(input)]);
            }
            ZipExtractor::new(&input.name, &input.bytes)
                .strict(strict)
                .extract_all()
                .await
        }))
        .await?;
        let files: Vec<RawFile> = expanded.into_iter().flatten().collect();
        info!(files = files.len(), "expanded inputs");

        let files: Vec<RawFile> = files
            .into_iter()
            .filter(|file| is_candidate(&file.name))
            .collect();
        info!(files = files.len(), "kept xml and xsl files");

        let parsed = try_join_all(
            files
                .iter()
                .map(|file| async move { ParsedDocument::parse(file).map(Arc::new) }),
        )
        .await?;
        info!(documents = parsed.len(), "parsed files");

        let registry: Registry = parsed.iter().cloned().collect();
        let resolved = self.resolve_all(&registry, &parsed);

        let results = try_join_all(
            resolved
                .iter()
                .map(|(document, stylesheets)| async move { self.transform(document, stylesheets) }),
        )
        .await?;
        info!(results = results.len(), "transformed documents");

        Ok(results)
    }

    /// Run the batch, reporting each file's failure in its own slot.
    ///
    /// Failures of files that are neither `.xml` nor `.xsl` are logged and
    /// dropped. A `.xsl` file that fails to parse is reported and left out of
    /// the registry. A malformed archive in strict mode is reported once under
    /// the archive's name.
    pub async fn run_isolated(&self, inputs: Vec<InputFile>) -> Vec<FileOutcome> {
        let strict = self.config.strict_archive;
        let expanded = join_all(inputs.into_iter().map(|input| async move {
            if !input.is_archive() {
                let name = input.name.clone();
                return vec![(name, Ok(RawFile::from(input)), false)];
            }
            match ZipExtractor::new(&input.name, &input.bytes)
                .strict(strict)
                .extract_settled()
                .await
            {
                Ok(entries) => entries
                    .into_iter()
                    .map(|(name, file)| (name, file, false))
                    .collect(),
                Err(e) => vec![(input.name.clone(), Err(e), true)],
            }
        }))
        .await;

        let files: Vec<Slot<RawFile>> = expanded
            .into_iter()
            .flatten()
            .filter_map(|(name, file, whole_archive)| {
                if whole_archive || is_candidate(&name) {
                    return Some((name, file));
                }
                if let Err(e) = file {
                    warn!(error = %e, "dropping failed file that is neither xml nor xsl");
                }
                None
            })
            .collect();
        info!(files = files.len(), "expanded and filtered inputs");

        let parsed: Vec<Slot<Arc<ParsedDocument>>> =
            join_all(files.into_iter().map(|(name, file)| async move {
                let parsed = file.and_then(|file| ParsedDocument::parse(&file).map(Arc::new));
                (name, parsed)
            }))
            .await;

        let registry: Registry = parsed
            .iter()
            .filter_map(|(_, parsed)| parsed.as_ref().ok().cloned())
            .collect();

        let outcomes = join_all(parsed.into_iter().map(|(name, parsed)| {
            let registry = &registry;
            async move {
                match parsed {
                    Err(e) => Some(FileOutcome {
                        name,
                        result: Err(e),
                    }),
                    Ok(document) if is_document(&document.name) => {
                        let stylesheets = registry.resolve(&StylesheetAssociation::of(&document));
                        Some(self.transform(&document, &stylesheets).into())
                    }
                    Ok(_) => None,
                }
            }
        }))
        .await;

        let outcomes: Vec<FileOutcome> = outcomes.into_iter().flatten().collect();
        info!(
            outcomes = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            "transformed documents"
        );
        outcomes
    }

    /// Pair every `.xml` document with its resolved stylesheets. The registry
    /// must already hold the whole batch.
    fn resolve_all(
        &self,
        registry: &Registry,
        parsed: &[Arc<ParsedDocument>],
    ) -> Vec<(Arc<ParsedDocument>, Vec<Arc<ParsedDocument>>)> {
        parsed
            .iter()
            .filter(|document| is_document(&document.name))
            .map(|document| {
                let association = StylesheetAssociation::of(document);
                let stylesheets = registry.resolve(&association);
                debug!(
                    document = %document.name,
                    declared = association.hrefs.len(),
                    resolved = stylesheets.len(),
                    "resolved stylesheets"
                );
                (document.clone(), stylesheets)
            })
            .collect()
    }

    /// Transform one document with its stylesheets, in resolution order.
    fn transform(
        &self,
        document: &ParsedDocument,
        stylesheets: &[Arc<ParsedDocument>],
    ) -> Result<TransformResult> {
        let failed = |reason: String| Error::Transform {
            name: document.name.clone(),
            reason,
        };

        let imports: Vec<&Document> = stylesheets.iter().map(|s| &s.document).collect();
        // The result tree can nest as deep as template calls do
        let markup = with_transform_stack(|| -> Result<String> {
            let output = self
                .transformer
                .transform(&document.document, &imports)
                .map_err(|e| failed(e.to_string()))?;
            to_markup(&output).map_err(|e| failed(e.to_string()))
        })
        .map_err(|e| failed(e.to_string()))??;
        debug!(document = %document.name, bytes = markup.len(), "transformed");

        Ok(TransformResult {
            name: document.name.clone(),
            markup,
        })
    }
}

impl From<Result<TransformResult>> for FileOutcome {
    fn from(result: Result<TransformResult>) -> Self {
        match result {
            Ok(result) => result.into(),
            Err(e) => Self {
                name: e.file_name().to_string(),
                result: Err(e),
            },
        }
    }
}
