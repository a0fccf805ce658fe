//! ImageMetadataStorage — save-or-update store for cloud image metadata.
//!
//! Each record lives in one document keyed by its natural key, so saving is
//! a single conditional write: insert when the key is new, update the image
//! id when only that changed, nothing when the record is already stored.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use warpgrid_docstore::{DocumentStore, Op, Query, StoreError, StoreResult, TxnRunner};

use super::series::series_version;
use super::types::*;
use crate::error::{PersistError, PersistResult};

pub const IMAGE_METADATA: &str = "cloudimagemetadata";

/// Source of creation timestamps, in nanoseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(saturating_nanos)
        .unwrap_or_default()
}

fn saturating_nanos(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
}

/// Stored form of a record. Attributes other than the image id never change
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ImageMetadataDoc {
    #[serde(rename = "_id")]
    id: String,
    model_uuid: String,
    image_id: String,
    stream: String,
    region: String,
    version: String,
    series: String,
    arch: String,
    virt_type: String,
    root_storage_type: String,
    /// 0 when unknown.
    root_storage_size: u64,
    date_created: i64,
    source: String,
    priority: i32,
}

impl ImageMetadataDoc {
    fn metadata(&self) -> Metadata {
        Metadata {
            attributes: MetadataAttributes {
                source: self.source.clone(),
                stream: self.stream.clone(),
                region: self.region.clone(),
                version: self.version.clone(),
                series: self.series.clone(),
                arch: self.arch.clone(),
                virt_type: self.virt_type.clone(),
                root_storage_type: self.root_storage_type.clone(),
                root_storage_size: (self.root_storage_size != 0).then_some(self.root_storage_size),
            },
            priority: self.priority,
            image_id: self.image_id.clone(),
        }
    }
}

/// Natural key of a record within a model.
pub fn build_key(model_uuid: &str, attributes: &MetadataAttributes) -> String {
    format!(
        "{model_uuid}:{}:{}:{}:{}:{}:{}:{}",
        attributes.stream,
        attributes.region,
        attributes.series,
        attributes.arch,
        attributes.virt_type,
        attributes.root_storage_type,
        attributes.source,
    )
}

/// Cloud image metadata of one model.
pub struct ImageMetadataStorage<S> {
    model_uuid: String,
    runner: TxnRunner<S>,
    clock: Clock,
}

impl<S: DocumentStore> ImageMetadataStorage<S> {
    pub fn new(runner: TxnRunner<S>, model_uuid: &str) -> Self {
        Self {
            model_uuid: model_uuid.to_string(),
            runner,
            clock: Arc::new(unix_nanos),
        }
    }

    /// Replace the creation-time clock.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Save a record, or update the image id of the record with the same
    /// natural key.
    pub fn save_metadata(&self, metadata: &Metadata) -> PersistResult<()> {
        let doc = self.metadata_doc(metadata)?;
        let wanted = doc.metadata();

        self.runner
            .run(|_| {
                match self.get_metadata(&doc.id)? {
                    Some(existing) if existing.attributes == wanted.attributes => {
                        if existing.image_id == wanted.image_id {
                            return Err(StoreError::NoOperations);
                        }
                        debug!(key = %doc.id, image_id = %doc.image_id, "updating cloud image id");
                        Ok(vec![Op::update(
                            IMAGE_METADATA,
                            &doc.id,
                            json!({"image_id": doc.image_id}),
                        )?])
                    }
                    Some(existing) => {
                        // The insert below fails its absence assertion on
                        // every attempt until the budget runs out.
                        warn!(
                            key = %doc.id,
                            stored = ?existing.attributes,
                            proposed = ?wanted.attributes,
                            "cloud image metadata differs from the stored record"
                        );
                        Ok(vec![Op::insert(IMAGE_METADATA, &doc.id, &doc)?])
                    }
                    None => {
                        debug!(key = %doc.id, image_id = %doc.image_id, "inserting cloud image metadata");
                        Ok(vec![Op::insert(IMAGE_METADATA, &doc.id, &doc)?])
                    }
                }
            })
            .map_err(PersistError::annotate(format!(
                "cannot save metadata for cloud image {}",
                metadata.image_id
            )))
    }

    /// Records matching `criteria`, oldest first, grouped by source.
    ///
    /// No match is [`PersistError::NotFound`].
    pub fn find_metadata(
        &self,
        criteria: &MetadataFilter,
    ) -> PersistResult<BTreeMap<String, Vec<Metadata>>> {
        let docs: Vec<ImageMetadataDoc> = self
            .runner
            .store()
            .fetch_all_as(IMAGE_METADATA, &self.search_query(criteria))
            .map_err(PersistError::annotate("cannot find cloud image metadata"))?;
        if docs.is_empty() {
            return Err(PersistError::NotFound("matching cloud image metadata".to_string()));
        }

        let mut metadata: BTreeMap<String, Vec<Metadata>> = BTreeMap::new();
        for doc in &docs {
            let one = doc.metadata();
            metadata
                .entry(one.attributes.source.clone())
                .or_default()
                .push(one);
        }
        Ok(metadata)
    }

    /// Distinct architectures of all stored records, sorted.
    pub fn supported_architectures(&self) -> PersistResult<Vec<String>> {
        let docs: Vec<ImageMetadataDoc> = self
            .runner
            .store()
            .fetch_all_as(IMAGE_METADATA, &self.model_query())
            .map_err(PersistError::annotate("cannot list cloud image architectures"))?;
        let arches: BTreeSet<String> = docs.into_iter().map(|doc| doc.arch).collect();
        Ok(arches.into_iter().collect())
    }

    fn get_metadata(&self, key: &str) -> StoreResult<Option<Metadata>> {
        match self
            .runner
            .store()
            .fetch_one_as::<ImageMetadataDoc>(IMAGE_METADATA, key)
        {
            Ok(doc) => Ok(Some(doc.metadata())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn metadata_doc(&self, metadata: &Metadata) -> PersistResult<ImageMetadataDoc> {
        let attrs = &metadata.attributes;
        if attrs.series.is_empty() {
            return Err(PersistError::NotValid(format!(
                "metadata for image {:?} (missing series)",
                metadata.image_id
            )));
        }
        if metadata.image_id.is_empty() {
            return Err(PersistError::NotValid("metadata with empty image id".to_string()));
        }
        let version = series_version(&attrs.series)?;

        Ok(ImageMetadataDoc {
            id: build_key(&self.model_uuid, attrs),
            model_uuid: self.model_uuid.clone(),
            image_id: metadata.image_id.clone(),
            stream: attrs.stream.clone(),
            region: attrs.region.clone(),
            version: version.to_string(),
            series: attrs.series.clone(),
            arch: attrs.arch.clone(),
            virt_type: attrs.virt_type.clone(),
            root_storage_type: attrs.root_storage_type.clone(),
            root_storage_size: attrs.root_storage_size.unwrap_or(0),
            date_created: (self.clock)(),
            source: attrs.source.clone(),
            priority: metadata.priority,
        })
    }

    fn model_query(&self) -> Query {
        Query::all().eq("model_uuid", self.model_uuid.as_str())
    }

    fn search_query(&self, criteria: &MetadataFilter) -> Query {
        let mut query = self.model_query().sort_by("date_created");
        if !criteria.stream.is_empty() {
            query = query.eq("stream", criteria.stream.as_str());
        }
        if !criteria.region.is_empty() {
            query = query.eq("region", criteria.region.as_str());
        }
        if !criteria.series.is_empty() {
            query = query.any_of("series", criteria.series.iter().map(String::as_str));
        }
        if !criteria.arches.is_empty() {
            query = query.any_of("arch", criteria.arches.iter().map(String::as_str));
        }
        if !criteria.virt_type.is_empty() {
            query = query.eq("virt_type", criteria.virt_type.as_str());
        }
        if !criteria.root_storage_type.is_empty() {
            query = query.eq("root_storage_type", criteria.root_storage_type.as_str());
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use warpgrid_docstore::{RedbDocStore, RetryConfig};

    fn storage(model_uuid: &str, store: Arc<RedbDocStore>) -> ImageMetadataStorage<RedbDocStore> {
        let ticks = Arc::new(AtomicI64::new(0));
        ImageMetadataStorage::new(TxnRunner::new(store, RetryConfig::default()), model_uuid)
            .with_clock(move || ticks.fetch_add(1, Ordering::SeqCst))
    }

    fn in_memory() -> ImageMetadataStorage<RedbDocStore> {
        storage("model-1", Arc::new(RedbDocStore::open_in_memory().unwrap()))
    }

    fn metadata(series: &str, arch: &str, image_id: &str) -> Metadata {
        Metadata {
            attributes: MetadataAttributes {
                source: "public".to_string(),
                stream: "released".to_string(),
                region: "region-1".to_string(),
                series: series.to_string(),
                arch: arch.to_string(),
                virt_type: "hvm".to_string(),
                root_storage_type: "ebs".to_string(),
                ..Default::default()
            },
            priority: 10,
            image_id: image_id.to_string(),
        }
    }

    fn stored_count(storage: &ImageMetadataStorage<RedbDocStore>) -> usize {
        storage
            .runner
            .store()
            .fetch_all(IMAGE_METADATA, &Query::all())
            .unwrap()
            .len()
    }

    #[test]
    fn key_covers_identifying_attributes() {
        let m = metadata("trusty", "amd64", "ami-1");
        assert_eq!(
            build_key("model-1", &m.attributes),
            "model-1:released:region-1:trusty:amd64:hvm:ebs:public"
        );
    }

    #[test]
    fn save_fills_in_version_from_series() {
        let storage = in_memory();
        storage.save_metadata(&metadata("trusty", "amd64", "ami-1")).unwrap();

        let found = storage.find_metadata(&MetadataFilter::default()).unwrap();
        assert_eq!(found["public"][0].attributes.version, "14.04");
        assert_eq!(found["public"][0].attributes.root_storage_size, None);
    }

    #[test]
    fn save_requires_known_series_and_image_id() {
        let storage = in_memory();
        assert!(storage.save_metadata(&metadata("", "amd64", "ami-1")).unwrap_err().is_not_valid());
        assert!(storage.save_metadata(&metadata("nope", "amd64", "ami-1")).unwrap_err().is_not_valid());
        assert!(storage.save_metadata(&metadata("trusty", "amd64", "")).unwrap_err().is_not_valid());
    }

    #[test]
    fn saving_same_record_twice_is_a_no_op() {
        let storage = in_memory();
        let m = metadata("trusty", "amd64", "ami-1");
        storage.save_metadata(&m).unwrap();
        storage.save_metadata(&m).unwrap();

        assert_eq!(stored_count(&storage), 1);
    }

    #[test]
    fn root_storage_size_round_trips() {
        let storage = in_memory();
        let mut m = metadata("xenial", "amd64", "ami-1");
        m.attributes.root_storage_size = Some(8);
        storage.save_metadata(&m).unwrap();

        let found = storage.find_metadata(&MetadataFilter::default()).unwrap();
        assert_eq!(found["public"][0].attributes.root_storage_size, Some(8));
        assert_eq!(found["public"][0].priority, 10);
    }

    #[test]
    fn changed_immutable_attribute_is_rejected() {
        let storage = in_memory();
        let mut m = metadata("trusty", "amd64", "ami-1");
        storage.save_metadata(&m).unwrap();

        m.attributes.root_storage_size = Some(20);
        let err = storage.save_metadata(&m).unwrap_err();

        assert!(matches!(
            err,
            PersistError::Conflict { ref context, attempts: 3 } if context.contains("ami-1")
        ));
        let found = storage.find_metadata(&MetadataFilter::default()).unwrap();
        assert_eq!(found["public"][0].attributes.root_storage_size, None);
    }

    #[test]
    fn clock_saturates_instead_of_wrapping() {
        assert_eq!(saturating_nanos(Duration::from_nanos(42)), 42);
        assert_eq!(saturating_nanos(Duration::MAX), i64::MAX);
    }

    #[test]
    fn find_sorts_by_creation_and_groups_by_source() {
        let storage = in_memory();
        let mut custom = metadata("trusty", "amd64", "custom-1");
        custom.attributes.source = "custom".to_string();
        storage.save_metadata(&metadata("xenial", "amd64", "ami-2")).unwrap();
        storage.save_metadata(&custom).unwrap();
        storage.save_metadata(&metadata("trusty", "amd64", "ami-1")).unwrap();

        let found = storage.find_metadata(&MetadataFilter::default()).unwrap();

        let public: Vec<_> = found["public"].iter().map(|m| m.image_id.as_str()).collect();
        assert_eq!(public, vec!["ami-2", "ami-1"]);
        assert_eq!(found["custom"].len(), 1);
    }

    #[test]
    fn find_without_match_is_not_found() {
        let storage = in_memory();
        assert!(storage.find_metadata(&MetadataFilter::default()).unwrap_err().is_not_found());

        storage.save_metadata(&metadata("trusty", "amd64", "ami-1")).unwrap();
        let filter = MetadataFilter {
            arches: vec!["arm64".to_string()],
            ..Default::default()
        };
        assert!(storage.find_metadata(&filter).unwrap_err().is_not_found());
    }

    #[test]
    fn models_do_not_see_each_other() {
        let store = Arc::new(RedbDocStore::open_in_memory().unwrap());
        let one = storage("model-1", store.clone());
        let two = storage("model-2", store);

        one.save_metadata(&metadata("trusty", "amd64", "ami-1")).unwrap();
        two.save_metadata(&metadata("trusty", "arm64", "ami-2")).unwrap();

        assert_eq!(one.supported_architectures().unwrap(), vec!["amd64".to_string()]);
        assert_eq!(stored_count(&one), 2);
        let found = two.find_metadata(&MetadataFilter::default()).unwrap();
        assert_eq!(found["public"][0].image_id, "ami-2");
    }

    #[test]
    fn supported_architectures_are_distinct_and_sorted() {
        let storage = in_memory();
        assert!(storage.supported_architectures().unwrap().is_empty());

        storage.save_metadata(&metadata("trusty", "ppc64el", "ami-1")).unwrap();
        storage.save_metadata(&metadata("xenial", "amd64", "ami-2")).unwrap();
        storage.save_metadata(&metadata("trusty", "amd64", "ami-3")).unwrap();

        assert_eq!(
            storage.supported_architectures().unwrap(),
            vec!["amd64".to_string(), "ppc64el".to_string()]
        );
    }
}
