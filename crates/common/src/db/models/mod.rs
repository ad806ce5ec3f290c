//! SeaORM entity models

mod admin_account;
mod study;

pub use study::{
    ActiveModel as StudyActiveModel,
    Column as StudyColumn,
    Entity as StudyEntity,
    Model as Study,
};

pub use admin_account::{
    ActiveModel as AdminAccountActiveModel,
    Column as AdminAccountColumn,
    Entity as AdminAccountEntity,
    Model as AdminAccountRow,
};
