//! Cache consequences of each mutation.
//!
//! Every mutation maps to one static [`InvalidationRule`]: the key patterns
//! it marks stale, the keys it removes outright (the entity no longer
//! exists), and an optional optimistic patch applied before the server
//! answers.
//!
//! | Mutation                      | Invalidates                               | Removes                      | Optimistic              |
//! |-------------------------------|-------------------------------------------|------------------------------|-------------------------|
//! | create-album                  | albums list                               |                              |                         |
//! | update-album(a)               | album(a), albums list                     |                              |                         |
//! | delete-album(a)               | albums list                               | album(a), album images(a)    |                         |
//! | add-image-to-album(a, i)      | album images(a)                           |                              | append i if absent      |
//! | remove-image-from-album(a, i) | album images(a)                           |                              | filter i out            |
//! | delete-image(i)               | images list, albums list, album images(*) | image(i), image blob(i)      |                         |
//! | upload-image                  | images list                               |                              |                         |
//!
//! The mutation lifecycle is [`apply_optimistic`] on dispatch, then
//! [`settle_success`] or [`settle_failure`] once the server answered.

use std::fmt;

use roshnii_core::{AlbumId, ImageId, ImageMetadata};

use crate::cache::{CacheKey, CacheStore, CacheValue, KeyPattern};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateAlbum,
    UpdateAlbum { album_id: AlbumId },
    DeleteAlbum { album_id: AlbumId },
    AddImageToAlbum { album_id: AlbumId, image_id: ImageId },
    RemoveImageFromAlbum { album_id: AlbumId, image_id: ImageId },
    DeleteImage { image_id: ImageId },
    UploadImage,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateAlbum => "create-album",
            Mutation::UpdateAlbum { .. } => "update-album",
            Mutation::DeleteAlbum { .. } => "delete-album",
            Mutation::AddImageToAlbum { .. } => "add-image-to-album",
            Mutation::RemoveImageFromAlbum { .. } => "remove-image-from-album",
            Mutation::DeleteImage { .. } => "delete-image",
            Mutation::UploadImage => "upload-image",
        }
    }

    pub fn rule(&self) -> InvalidationRule {
        match self {
            Mutation::CreateAlbum => InvalidationRule::invalidating([CacheKey::AlbumsList.into()]),
            Mutation::UpdateAlbum { album_id } => InvalidationRule::invalidating([
                CacheKey::AlbumDetail(album_id.clone()).into(),
                CacheKey::AlbumsList.into(),
            ]),
            Mutation::DeleteAlbum { album_id } => {
                InvalidationRule::invalidating([CacheKey::AlbumsList.into()]).removing([
                    CacheKey::AlbumDetail(album_id.clone()),
                    CacheKey::AlbumImages(album_id.clone()),
                ])
            }
            Mutation::AddImageToAlbum { album_id, image_id } => {
                InvalidationRule::invalidating([CacheKey::AlbumImages(album_id.clone()).into()])
                    .with_optimistic(OptimisticPatch::AppendAlbumImage {
                        album_id: album_id.clone(),
                        image_id: image_id.clone(),
                    })
            }
            Mutation::RemoveImageFromAlbum { album_id, image_id } => {
                InvalidationRule::invalidating([CacheKey::AlbumImages(album_id.clone()).into()])
                    .with_optimistic(OptimisticPatch::RemoveAlbumImage {
                        album_id: album_id.clone(),
                        image_id: image_id.clone(),
                    })
            }
            Mutation::DeleteImage { image_id } => InvalidationRule::invalidating([
                CacheKey::ImagesList.into(),
                CacheKey::AlbumsList.into(),
                KeyPattern::AllAlbumImages,
            ])
            .removing([
                CacheKey::ImageDetail(image_id.clone()),
                CacheKey::ImageBlob(image_id.clone()),
            ]),
            Mutation::UploadImage => InvalidationRule::invalidating([CacheKey::ImagesList.into()]),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidationRule {
    pub invalidates: Vec<KeyPattern>,
    pub removes: Vec<CacheKey>,
    pub optimistic: Option<OptimisticPatch>,
}

impl InvalidationRule {
    fn invalidating(patterns: impl IntoIterator<Item = KeyPattern>) -> Self {
        Self {
            invalidates: patterns.into_iter().collect(),
            ..Self::default()
        }
    }

    fn removing(mut self, keys: impl IntoIterator<Item = CacheKey>) -> Self {
        self.removes.extend(keys);
        self
    }

    fn with_optimistic(mut self, patch: OptimisticPatch) -> Self {
        self.optimistic = Some(patch);
        self
    }
}

/// Local edit of an album's image listing applied ahead of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticPatch {
    AppendAlbumImage { album_id: AlbumId, image_id: ImageId },
    RemoveAlbumImage { album_id: AlbumId, image_id: ImageId },
}

impl OptimisticPatch {
    pub fn key(&self) -> CacheKey {
        match self {
            OptimisticPatch::AppendAlbumImage { album_id, .. }
            | OptimisticPatch::RemoveAlbumImage { album_id, .. } => {
                CacheKey::AlbumImages(album_id.clone())
            }
        }
    }

    /// New listing for `current`, or `None` when the patch changes nothing.
    ///
    /// Appending needs the image's metadata (`known`); without it, or when the
    /// listing is not cached, the patch is skipped and the post-mutation
    /// refetch brings the listing up to date instead.
    pub fn apply(
        &self,
        current: Option<&CacheValue>,
        known: Option<&ImageMetadata>,
    ) -> Option<CacheValue> {
        let Some(CacheValue::Images(images)) = current else {
            return None;
        };
        match self {
            OptimisticPatch::AppendAlbumImage { image_id, .. } => {
                if images.iter().any(|image| &image.id == image_id) {
                    return None;
                }
                let image = known.filter(|image| &image.id == image_id)?;
                let mut next = images.clone();
                next.push(image.clone());
                Some(CacheValue::Images(next))
            }
            OptimisticPatch::RemoveAlbumImage { image_id, .. } => {
                if !images.iter().any(|image| &image.id == image_id) {
                    return None;
                }
                let next = images
                    .iter()
                    .filter(|image| &image.id != image_id)
                    .cloned()
                    .collect();
                Some(CacheValue::Images(next))
            }
        }
    }

    fn image_id(&self) -> &ImageId {
        match self {
            OptimisticPatch::AppendAlbumImage { image_id, .. }
            | OptimisticPatch::RemoveAlbumImage { image_id, .. } => image_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    key: CacheKey,
    previous: Option<CacheValue>,
    generation: u64,
}

/// A dispatched mutation awaiting the server's answer.
#[derive(Debug, Clone)]
#[must_use = "a pending mutation must be settled"]
pub struct PendingMutation {
    mutation: Mutation,
    snapshot: Option<Snapshot>,
}

impl PendingMutation {
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Whether an optimistic patch is currently applied.
    pub fn is_patched(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Applies the mutation's optimistic patch, if any, and remembers the
/// pre-mutation value for rollback.
pub fn apply_optimistic(store: &CacheStore, mutation: Mutation) -> PendingMutation {
    let snapshot = mutation.rule().optimistic.and_then(|patch| {
        let key = patch.key();
        let known = find_image(store, patch.image_id());
        let (previous, generation) =
            store.update(&key, |current| patch.apply(current, known.as_ref()))?;
        tracing::debug!(mutation = %mutation, %key, "optimistic patch applied");
        Some(Snapshot {
            key,
            previous,
            generation,
        })
    });
    PendingMutation { mutation, snapshot }
}

/// Applies the mutation's rule after the server confirmed it. Observed
/// entries refetch, which overwrites any optimistic patch with server truth.
pub fn settle_success(store: &CacheStore, pending: PendingMutation) {
    let rule = pending.mutation.rule();
    for key in &rule.removes {
        store.remove(key);
    }
    for pattern in &rule.invalidates {
        store.invalidate_matching(pattern);
    }
    tracing::debug!(mutation = %pending.mutation, "mutation settled");
}

/// Rolls the optimistic patch back after the server rejected the mutation.
///
/// The pre-mutation value is restored only if nothing else wrote the entry
/// in the meantime. Returns whether a rollback happened.
pub fn settle_failure(store: &CacheStore, pending: PendingMutation) -> bool {
    let Some(snapshot) = pending.snapshot else {
        return false;
    };
    let restored = store.restore(&snapshot.key, snapshot.generation, snapshot.previous);
    tracing::debug!(mutation = %pending.mutation, key = %snapshot.key, restored, "optimistic patch rolled back");
    restored
}

/// Image metadata already known to the cache, from the detail entry or the
/// global listing.
fn find_image(store: &CacheStore, image_id: &ImageId) -> Option<ImageMetadata> {
    if let Some(CacheValue::Image(image)) = store.peek(&CacheKey::ImageDetail(image_id.clone())) {
        return Some(image);
    }
    match store.peek(&CacheKey::ImagesList) {
        Some(CacheValue::Images(images)) => images.into_iter().find(|image| &image.id == image_id),
        _ => None,
    }
}
