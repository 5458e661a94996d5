pub mod calendar;
pub mod category;
pub mod record;
pub mod user;
pub mod vendor;

// Re-export only the types we actually use
pub use calendar::{CalendarEvent, EventUpdate, NewEvent};
pub use category::{
    CategoryStyle, ExpenseCategory, ExpenseCategoryInput, IncomeCategory, IncomeCategoryInput,
};
pub use record::{
    encode_invoice, Approval, ApprovalWithUser, Expense, ExpenseWithUser, IncomeWithUser,
    WalletEntry,
};
pub use user::{CreateUser, LoginRequest, User, UserResponse};
pub use vendor::{Vendor, VendorInput};
