use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    Email,
    PasswordHash,
    Role,
    MemberId,
    IsActive,
    LastLoginAt,
}

#[derive(DeriveIden)]
pub enum Family {
    Table,
    Id,
    Name,
    Address,
    Phone,
}

#[derive(DeriveIden)]
pub enum Member {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    Phone,
    BirthDate,
    Address,
    FamilyId,
    FamilyRole,
    MembershipStatus,
    JoinedOn,
    IsActive,
    Notes,
}

#[derive(DeriveIden)]
pub enum Group {
    Table,
    Id,
    Name,
    Description,
    Kind,
    LeaderId,
    IsActive,
}

#[derive(DeriveIden)]
pub enum GroupMembership {
    Table,
    Id,
    GroupId,
    MemberId,
}

#[derive(DeriveIden)]
pub enum Campaign {
    Table,
    Id,
    Name,
    Description,
    GoalCents,
    StartsOn,
    EndsOn,
    IsActive,
}

#[derive(DeriveIden)]
pub enum Donation {
    Table,
    Id,
    MemberId,
    CampaignId,
    AmountCents,
    DonatedOn,
    Method,
    Reference,
    IsTaxDeductible,
    Notes,
    RecordedBy,
}

#[derive(DeriveIden)]
pub enum Payment {
    Table,
    Id,
    MemberId,
    CampaignId,
    AmountCents,
    Currency,
    ProviderRef,
    Status,
    DonationId,
    FailureReason,
}

#[derive(DeriveIden)]
pub enum Event {
    Table,
    Id,
    Title,
    Description,
    Location,
    StartsAt,
    EndsAt,
    Capacity,
    IsPublic,
    IsCancelled,
    CreatedBy,
}

#[derive(DeriveIden)]
pub enum Rsvp {
    Table,
    Id,
    EventId,
    MemberId,
    Response,
    Guests,
    ReminderSent,
}

#[derive(DeriveIden)]
pub enum AttendanceRecord {
    Table,
    Id,
    EventId,
    MemberId,
    Method,
    CheckedInAt,
    CheckedInBy,
}

#[derive(DeriveIden)]
pub enum MemberQrCode {
    Table,
    Id,
    MemberId,
    Token,
    IsActive,
    LastUsedAt,
}

#[derive(DeriveIden)]
pub enum WorshipService {
    Table,
    Id,
    Title,
    ServiceDate,
    StartTime,
    Theme,
    Preacher,
    Scripture,
    EventId,
}

#[derive(DeriveIden)]
pub enum ServiceItem {
    Table,
    Id,
    ServiceId,
    Position,
    Kind,
    Title,
    DurationMinutes,
    LeaderId,
}

#[derive(DeriveIden)]
pub enum VolunteerPosition {
    Table,
    Id,
    Name,
    Description,
    GroupId,
    SlotsNeeded,
    IsActive,
}

#[derive(DeriveIden)]
pub enum VolunteerSchedule {
    Table,
    Id,
    PositionId,
    MemberId,
    ServeDate,
    Status,
    ReminderSent,
}

#[derive(DeriveIden)]
pub enum VolunteerUnavailability {
    Table,
    Id,
    MemberId,
    UnavailableOn,
    Reason,
}

#[derive(DeriveIden)]
pub enum ShiftSwap {
    Table,
    Id,
    ScheduleId,
    RequestedBy,
    OfferedTo,
    AcceptedBy,
    Status,
    Reason,
}

#[derive(DeriveIden)]
pub enum Newsletter {
    Table,
    Id,
    Subject,
    Body,
    Status,
    ScheduledFor,
    SentAt,
    RecipientCount,
    CreatedBy,
}

#[derive(DeriveIden)]
pub enum Notification {
    Table,
    Id,
    MemberId,
    Category,
    Title,
    Body,
    Link,
    IsRead,
    ReadAt,
}

#[derive(DeriveIden)]
pub enum NotificationPreference {
    Table,
    Id,
    MemberId,
    EmailEnabled,
    InAppEnabled,
    Events,
    Volunteers,
    Newsletters,
    HelpRequests,
    Onboarding,
}

#[derive(DeriveIden)]
pub enum HelpRequest {
    Table,
    Id,
    RequesterId,
    Title,
    Description,
    Category,
    Urgency,
    Status,
    AssignedTo,
    IsConfidential,
    ResolvedAt,
}

#[derive(DeriveIden)]
pub enum HelpRequestComment {
    Table,
    Id,
    RequestId,
    AuthorId,
    Body,
    IsInternal,
}

#[derive(DeriveIden)]
pub enum TrainingCourse {
    Table,
    Id,
    Name,
    Description,
    IsActive,
}

#[derive(DeriveIden)]
pub enum Lesson {
    Table,
    Id,
    CourseId,
    Title,
    Position,
    DurationMinutes,
}

#[derive(DeriveIden)]
pub enum ScheduledLesson {
    Table,
    Id,
    MemberId,
    LessonId,
    ScheduledAt,
    Status,
    ReminderSent,
}

#[derive(DeriveIden)]
pub enum Interview {
    Table,
    Id,
    MemberId,
    InterviewerId,
    ScheduledAt,
    Status,
    Notes,
}
