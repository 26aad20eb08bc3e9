//! The public build API and its configuration surface.

use crate::driver::{TreeDriver, MAX_STORYLINE_SPLIT_DEPTH};
use crate::error::BuildError;
use crate::fragment::FragmentList;
use bindery_idf::{Book, FootnoteIndex};
use bindery_style::StyleRegistry;
use bindery_types::ResourceName;
use std::collections::HashMap;

/// An explicit cover binding: the registered image resource and its pixel
/// dimensions for the cover page template.
#[derive(Debug, Clone)]
pub struct CoverSpec {
    pub resource: ResourceName,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct PublicationOptions {
    /// Reference screen width in pixels, for width-ratio image styles.
    pub screen_width: f64,
    /// First EID to mint; readers expect a publication-unique sequence.
    pub start_eid: u32,
    /// Titled sections at or above this depth open their own storyline.
    pub max_storyline_split_depth: usize,
    /// Generate the annotation page when the book carries an annotation.
    pub annotation_page: bool,
    /// Generate the table-of-contents page.
    pub toc_page: bool,
    /// Overrides the source cover image when set.
    pub cover: Option<CoverSpec>,
    pub chapter_vignette_top: Option<ResourceName>,
    pub chapter_vignette_bottom: Option<ResourceName>,
    /// Body names holding footnote targets.
    pub footnote_body_names: Vec<String>,
    /// Known pixel dimensions per image resource, from the resource
    /// registration collaborator.
    pub image_sizes: HashMap<String, (f64, f64)>,
}

impl Default for PublicationOptions {
    fn default() -> Self {
        Self {
            screen_width: 1264.0,
            start_eid: 1,
            max_storyline_split_depth: MAX_STORYLINE_SPLIT_DEPTH,
            annotation_page: true,
            toc_page: true,
            cover: None,
            chapter_vignette_top: None,
            chapter_vignette_bottom: None,
            footnote_body_names: vec!["notes".to_string(), "comments".to_string()],
            image_sizes: HashMap::new(),
        }
    }
}

impl PublicationOptions {
    pub fn builder() -> PublicationOptionsBuilder {
        PublicationOptionsBuilder {
            options: Self::default(),
        }
    }
}

/// Fluent configuration for [`build_publication`].
#[derive(Debug)]
pub struct PublicationOptionsBuilder {
    options: PublicationOptions,
}

impl PublicationOptionsBuilder {
    pub fn screen_width(mut self, width: f64) -> Self {
        self.options.screen_width = width;
        self
    }

    pub fn start_eid(mut self, eid: u32) -> Self {
        self.options.start_eid = eid;
        self
    }

    pub fn max_storyline_split_depth(mut self, depth: usize) -> Self {
        self.options.max_storyline_split_depth = depth;
        self
    }

    pub fn annotation_page(mut self, enabled: bool) -> Self {
        self.options.annotation_page = enabled;
        self
    }

    pub fn toc_page(mut self, enabled: bool) -> Self {
        self.options.toc_page = enabled;
        self
    }

    pub fn cover(mut self, cover: CoverSpec) -> Self {
        self.options.cover = Some(cover);
        self
    }

    pub fn chapter_vignettes(
        mut self,
        top: Option<ResourceName>,
        bottom: Option<ResourceName>,
    ) -> Self {
        self.options.chapter_vignette_top = top;
        self.options.chapter_vignette_bottom = bottom;
        self
    }

    pub fn footnote_body_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.footnote_body_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn image_size(mut self, resource: impl Into<String>, width: f64, height: f64) -> Self {
        self.options.image_sizes.insert(resource.into(), (width, height));
        self
    }

    pub fn build(self) -> PublicationOptions {
        self.options
    }
}

/// Transforms a parsed source tree plus a style registry into the ordered
/// fragment list the encoder serializes.
///
/// The registry stays with the caller: the serializer reads the registered
/// styles and their usage flags out of it afterwards.
pub fn build_publication(
    book: &Book,
    footnotes: &FootnoteIndex,
    registry: &mut StyleRegistry,
    options: &PublicationOptions,
) -> Result<FragmentList, BuildError> {
    TreeDriver::new(registry, footnotes, options).run(book)
}
