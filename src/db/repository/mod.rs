pub mod attendance_repository;
pub mod event_repository;
pub mod reminder_repository;
pub mod role_repository;
pub mod schedule_repository;
pub mod signup_repository;
pub mod template_repository;
pub mod waitlist_repository;

pub use attendance_repository::AttendanceRepository;
pub use event_repository::EventRepository;
pub use reminder_repository::ReminderRepository;
pub use role_repository::RoleRepository;
pub use schedule_repository::ScheduleRepository;
pub use signup_repository::SignupRepository;
pub use template_repository::TemplateRepository;
pub use waitlist_repository::WaitlistRepository;
