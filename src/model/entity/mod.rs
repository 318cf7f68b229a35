mod user;
pub use user::{REFERRAL_CODE_LEN, UserEntity, UserEntityCreateUpdate};

mod account_token;
pub use account_token::{AccountToken, AccountTokenCreate, TokenPurpose};

mod subscription;
pub use subscription::{Subscription, SubscriptionUpsert};

mod course;
pub use course::{Course, CourseCreate, CourseWithLessonsRow, roles_up_to};

mod lesson;
pub use lesson::{Lesson, LessonCreate, LessonWithStatusRow};

mod lesson_progress;
pub use lesson_progress::LessonProgress;

mod event;
pub use event::{Event, EventCreate};

mod event_schedule;
pub use event_schedule::{EventSchedule, EventScheduleCreate, EventScheduleWithSeats};

mod registration;
pub use registration::{AttendanceUpdate, MyRegistrationRow, Registration, RosterRow};

mod referral;
pub use referral::{ReferredUserRow, Referral};

mod contract;
pub use contract::{Contract, ContractCreate};

mod compensation;
pub use compensation::{Compensation, MonthlyActivityRow};

mod promotion;
pub use promotion::{ChecklistUpdate, PromotionRequest};

mod notification;
pub use notification::Notification;

mod webhook_event;
pub use webhook_event::WebhookEvent;
