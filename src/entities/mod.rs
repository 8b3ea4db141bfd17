pub mod prelude;

pub mod attendance_record;
pub mod campaign;
pub mod donation;
pub mod event;
pub mod family;
pub mod group;
pub mod group_membership;
pub mod help_request;
pub mod help_request_comment;
pub mod interview;
pub mod lesson;
pub mod member;
pub mod member_qr_code;
pub mod newsletter;
pub mod notification;
pub mod notification_preference;
pub mod payment;
pub mod rsvp;
pub mod scheduled_lesson;
pub mod sea_orm_active_enums;
pub mod service_item;
pub mod shift_swap;
pub mod training_course;
pub mod user;
pub mod volunteer_position;
pub mod volunteer_schedule;
pub mod volunteer_unavailability;
pub mod worship_service;
