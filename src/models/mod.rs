pub mod article;
pub mod event;
pub mod money;
pub mod reference;
pub mod upload;

pub use article::{
    Article, ArticleData, ArticleFilters, ArticleImage, ArticleListItem, ArticleStateUpdate,
    Condition, Page, SortOrder,
};
pub use event::{EventLog, EventLogImage, GroupSelection, GroupedEvent, NewEventLog, NewGroupedEvent};
pub use money::Money;
pub use reference::{
    AvailabilityType, Brand, CategoryType, Color, DayMoment, EventType, ItemUser, Material,
    Status, StatusCategory, StorageLocation, Supplier,
};
pub use upload::ImageUpload;
