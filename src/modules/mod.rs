pub mod books;

use std::sync::Arc;

use bookstore_kernel::ModuleRegistry;
use bookstore_media::MediaStore;

use books::store::BookStore;

/// Register all project-specific modules with the registry
pub fn register_all(
    registry: &mut ModuleRegistry,
    store: Arc<dyn BookStore>,
    media: Arc<dyn MediaStore>,
) {
    registry.register(books::create_module(store, media));
}
