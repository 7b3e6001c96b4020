//! Application Services
//!
//! User-facing operations built on the realtime core.
//!
//! ## Available Services
//!
//! - **CatalogService**: initial pull of courses and notifications
//! - **WishlistService**: optimistic wishlist toggling with local persistence
//! - **CourseAdminService**: optimistic bulk course edits

pub mod catalog_service;
pub mod course_admin_service;
pub mod wishlist_service;

pub use catalog_service::{
    CatalogService, CatalogServiceImpl, InitialLoad, COURSES_ENDPOINT, NOTIFICATIONS_ENDPOINT,
};
pub use course_admin_service::{CourseAdminService, CourseAdminServiceImpl, CoursePatchCommand};
pub use wishlist_service::{
    WishlistIntent, WishlistService, WishlistServiceImpl, WishlistToggle, WISHLIST_STORAGE_KEY,
};
