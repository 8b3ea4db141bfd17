pub use super::attendance_record::Entity as AttendanceRecord;
pub use super::campaign::Entity as Campaign;
pub use super::donation::Entity as Donation;
pub use super::event::Entity as Event;
pub use super::family::Entity as Family;
pub use super::group::Entity as Group;
pub use super::group_membership::Entity as GroupMembership;
pub use super::help_request::Entity as HelpRequest;
pub use super::help_request_comment::Entity as HelpRequestComment;
pub use super::interview::Entity as Interview;
pub use super::lesson::Entity as Lesson;
pub use super::member::Entity as Member;
pub use super::member_qr_code::Entity as MemberQrCode;
pub use super::newsletter::Entity as Newsletter;
pub use super::notification::Entity as Notification;
pub use super::notification_preference::Entity as NotificationPreference;
pub use super::payment::Entity as Payment;
pub use super::rsvp::Entity as Rsvp;
pub use super::scheduled_lesson::Entity as ScheduledLesson;
pub use super::service_item::Entity as ServiceItem;
pub use super::shift_swap::Entity as ShiftSwap;
pub use super::training_course::Entity as TrainingCourse;
pub use super::user::Entity as User;
pub use super::volunteer_position::Entity as VolunteerPosition;
pub use super::volunteer_schedule::Entity as VolunteerSchedule;
pub use super::volunteer_unavailability::Entity as VolunteerUnavailability;
pub use super::worship_service::Entity as WorshipService;
